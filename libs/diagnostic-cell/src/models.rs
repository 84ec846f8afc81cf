use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use shared_models::roles::Urgency;
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE DIAGNOSTIC ORDER MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DiagnosticOrder {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    /// Null until a center claims the order with its first status write.
    pub diagnostic_center_id: Option<Uuid>,
    pub test_types: Vec<String>,
    pub urgency: Urgency,
    pub status: DiagnosticOrderStatus,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub results_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum DiagnosticOrderStatus {
    Pending,
    Scheduled,
    SampleCollected,
    InProgress,
    Completed,
    Cancelled,
}

impl DiagnosticOrderStatus {
    fn rank(&self) -> u8 {
        match self {
            DiagnosticOrderStatus::Pending => 0,
            DiagnosticOrderStatus::Scheduled => 1,
            DiagnosticOrderStatus::SampleCollected => 2,
            DiagnosticOrderStatus::InProgress => 3,
            DiagnosticOrderStatus::Completed => 4,
            DiagnosticOrderStatus::Cancelled => 5,
        }
    }

    /// Processing moves strictly forward; cancellation is allowed from any
    /// non-terminal state.
    pub fn can_transition_to(&self, next: DiagnosticOrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == DiagnosticOrderStatus::Cancelled {
            return true;
        }
        next != DiagnosticOrderStatus::Pending && next.rank() > self.rank()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DiagnosticOrderStatus::Completed | DiagnosticOrderStatus::Cancelled
        )
    }
}

impl fmt::Display for DiagnosticOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticOrderStatus::Pending => write!(f, "pending"),
            DiagnosticOrderStatus::Scheduled => write!(f, "scheduled"),
            DiagnosticOrderStatus::SampleCollected => write!(f, "sample_collected"),
            DiagnosticOrderStatus::InProgress => write!(f, "in_progress"),
            DiagnosticOrderStatus::Completed => write!(f, "completed"),
            DiagnosticOrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub test_types: Vec<String>,
    pub urgency: Urgency,
    /// Target one center; omit to fan out to all centers.
    pub diagnostic_center_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub diagnostic_center_id: Uuid,
    pub status: DiagnosticOrderStatus,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub results_url: Option<String>,
    pub notes: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum DiagnosticError {
    #[error("Diagnostic order not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Ordering doctor not found")]
    DoctorNotFound,

    #[error("Diagnostic center not found")]
    CenterNotFound,

    #[error("Order already claimed by another diagnostic center")]
    AlreadyClaimed,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: DiagnosticOrderStatus,
        to: DiagnosticOrderStatus,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for DiagnosticError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DiagnosticError::NotFound,
            other => DiagnosticError::DatabaseError(other.to_string()),
        }
    }
}
