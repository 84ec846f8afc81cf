use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_models::roles::Role;
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// APPLICATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProviderApplication {
    pub id: Uuid,
    pub user_id: Uuid,
    /// gp or specialist; granted on approval.
    pub requested_role: Role,
    pub license_number: String,
    pub specialization: Option<String>,
    pub status: ApplicationStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PartnerApplication {
    pub id: Uuid,
    pub user_id: Uuid,
    /// pharmacy or diagnostic_center; granted on approval.
    pub requested_role: Role,
    pub business_name: String,
    pub address: String,
    pub license_number: String,
    pub status: ApplicationStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationStatus::Pending => write!(f, "pending"),
            ApplicationStatus::Approved => write!(f, "approved"),
            ApplicationStatus::Rejected => write!(f, "rejected"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderApplicationRequest {
    pub requested_role: Role,
    pub license_number: String,
    pub specialization: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerApplicationRequest {
    pub requested_role: Role,
    pub business_name: String,
    pub address: String,
    pub license_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub action: ReviewAction,
    pub reason: Option<String>,
}

/// Either kind of application, as returned by review and pending listings.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Application {
    Provider(ProviderApplication),
    Partner(PartnerApplication),
}

impl Application {
    pub fn user_id(&self) -> Uuid {
        match self {
            Application::Provider(a) => a.user_id,
            Application::Partner(a) => a.user_id,
        }
    }

    pub fn requested_role(&self) -> Role {
        match self {
            Application::Provider(a) => a.requested_role,
            Application::Partner(a) => a.requested_role,
        }
    }

    pub fn status(&self) -> ApplicationStatus {
        match self {
            Application::Provider(a) => a.status,
            Application::Partner(a) => a.status,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApplicationError {
    #[error("Application not found")]
    NotFound,

    #[error("An application is already pending for this user")]
    AlreadyPending,

    #[error("Application already reviewed (status: {0})")]
    AlreadyReviewed(ApplicationStatus),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for ApplicationError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApplicationError::NotFound,
            other => ApplicationError::DatabaseError(other.to_string()),
        }
    }
}
