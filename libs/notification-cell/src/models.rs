use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Append-only per-user notification row. Read state is the only mutable
/// field, and only the owner may flip it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum NotificationType {
    ConsultationRequest,
    ConsultationAccepted,
    ConsultationStarted,
    ConsultationDeclined,
    ConsultationCancelled,
    ReferralCreated,
    ReferralAccepted,
    ReferralDeclined,
    PrescriptionCreated,
    PrescriptionAssigned,
    PrescriptionStatus,
    DiagnosticOrderCreated,
    DiagnosticOrderScheduled,
    DiagnosticOrderCompleted,
    DiagnosticOrderStatus,
    ApplicationApproved,
    ApplicationRejected,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationType::ConsultationRequest => "consultation_request",
            NotificationType::ConsultationAccepted => "consultation_accepted",
            NotificationType::ConsultationStarted => "consultation_started",
            NotificationType::ConsultationDeclined => "consultation_declined",
            NotificationType::ConsultationCancelled => "consultation_cancelled",
            NotificationType::ReferralCreated => "referral_created",
            NotificationType::ReferralAccepted => "referral_accepted",
            NotificationType::ReferralDeclined => "referral_declined",
            NotificationType::PrescriptionCreated => "prescription_created",
            NotificationType::PrescriptionAssigned => "prescription_assigned",
            NotificationType::PrescriptionStatus => "prescription_status",
            NotificationType::DiagnosticOrderCreated => "diagnostic_order_created",
            NotificationType::DiagnosticOrderScheduled => "diagnostic_order_scheduled",
            NotificationType::DiagnosticOrderCompleted => "diagnostic_order_completed",
            NotificationType::DiagnosticOrderStatus => "diagnostic_order_status",
            NotificationType::ApplicationApproved => "application_approved",
            NotificationType::ApplicationRejected => "application_rejected",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}
