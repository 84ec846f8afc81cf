use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use consultation_cell::models::LifecycleAction;

// ==============================================================================
// CORE REFERRAL MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Referral {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub referring_provider_id: Uuid,
    /// Null until a specialist accepts.
    pub specialist_id: Option<Uuid>,
    pub specialization: String,
    pub reason: String,
    pub notes: Option<String>,
    pub status: ReferralStatus,
    /// Consultation spawned by acceptance.
    pub consultation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Accepted,
    Declined,
    Completed,
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferralStatus::Pending => write!(f, "pending"),
            ReferralStatus::Accepted => write!(f, "accepted"),
            ReferralStatus::Declined => write!(f, "declined"),
            ReferralStatus::Completed => write!(f, "completed"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReferralRequest {
    pub patient_id: Uuid,
    pub referring_provider_id: Uuid,
    pub specialization: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralActionRequest {
    pub specialist_id: Uuid,
    pub action: LifecycleAction,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AvailableSpecialist {
    pub id: Uuid,
    pub name: String,
    pub specialization: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReferralResponse {
    pub referral: Referral,
    pub available_specialists: Vec<AvailableSpecialist>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReferralError {
    #[error("Referral not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Referring provider not found")]
    ProviderNotFound,

    #[error("Referral already resolved: {0}")]
    AlreadyResolved(ReferralStatus),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for ReferralError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ReferralError::NotFound,
            other => ReferralError::DatabaseError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ReferralStatus::Accepted).unwrap(),
            "\"accepted\""
        );
    }

    #[test]
    fn display_matches_wire_format() {
        for status in [
            ReferralStatus::Pending,
            ReferralStatus::Accepted,
            ReferralStatus::Declined,
            ReferralStatus::Completed,
        ] {
            let wire = serde_json::to_string(&status).unwrap();
            assert_eq!(wire.trim_matches('"'), status.to_string());
        }
    }
}
