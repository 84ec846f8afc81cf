use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::roles::{Role, Urgency};

// ==============================================================================
// CORE CONSULTATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Consultation {
    pub id: Uuid,
    pub patient_id: Uuid,
    /// Null until a provider accepts; at most one assignment ever survives.
    pub provider_id: Option<Uuid>,
    pub provider_type: Role,
    pub chief_complaint: String,
    pub urgency: Urgency,
    pub status: ConsultationStatus,
    pub consultation_fee: Option<f64>,
    pub referral_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ConsultationStatus {
    Pending,
    Accepted,
    Declined,
    InProgress,
    Completed,
    Cancelled,
}

impl ConsultationStatus {
    /// Statuses move forward only; cancellation is the administrative
    /// exception reachable from any live state.
    pub fn can_transition_to(&self, next: ConsultationStatus) -> bool {
        use ConsultationStatus::*;
        match (self, next) {
            (Pending, Accepted) | (Pending, Declined) | (Pending, Cancelled) => true,
            (Accepted, InProgress) | (Accepted, Cancelled) => true,
            (InProgress, Completed) | (InProgress, Cancelled) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConsultationStatus::Declined
                | ConsultationStatus::Completed
                | ConsultationStatus::Cancelled
        )
    }
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsultationStatus::Pending => write!(f, "pending"),
            ConsultationStatus::Accepted => write!(f, "accepted"),
            ConsultationStatus::Declined => write!(f, "declined"),
            ConsultationStatus::InProgress => write!(f, "in_progress"),
            ConsultationStatus::Completed => write!(f, "completed"),
            ConsultationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConsultationRequest {
    pub patient_id: Uuid,
    pub provider_type: Role,
    pub chief_complaint: String,
    pub urgency: Urgency,
    pub consultation_fee: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Accept,
    Decline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationActionRequest {
    pub provider_id: Uuid,
    pub action: LifecycleAction,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConsultationError {
    #[error("Consultation not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Consultation already resolved: {0}")]
    AlreadyResolved(ConsultationStatus),

    #[error("Invalid status transition from {0}")]
    InvalidStatusTransition(ConsultationStatus),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized access to consultation")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for ConsultationError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ConsultationError::NotFound,
            other => ConsultationError::DatabaseError(other.to_string()),
        }
    }
}
