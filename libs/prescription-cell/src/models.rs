use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE PRESCRIPTION MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Prescription {
    pub id: Uuid,
    pub consultation_id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    /// Null until a pharmacy claims the prescription, directly or by QR.
    pub pharmacy_id: Option<Uuid>,
    /// Opaque claim credential presented as a QR code.
    pub qr_token: String,
    pub status: PrescriptionStatus,
    pub medications: Json<Vec<Medication>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum PrescriptionStatus {
    Pending,
    Preparing,
    Ready,
    Delivered,
    Cancelled,
}

impl PrescriptionStatus {
    /// Fulfilment moves strictly forward; cancellation is allowed until
    /// delivery.
    pub fn can_transition_to(&self, next: PrescriptionStatus) -> bool {
        use PrescriptionStatus::*;
        match (self, next) {
            (Pending, Preparing) | (Pending, Cancelled) => true,
            (Preparing, Ready) | (Preparing, Cancelled) => true,
            (Ready, Delivered) | (Ready, Cancelled) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PrescriptionStatus::Delivered | PrescriptionStatus::Cancelled)
    }
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrescriptionStatus::Pending => write!(f, "pending"),
            PrescriptionStatus::Preparing => write!(f, "preparing"),
            PrescriptionStatus::Ready => write!(f, "ready"),
            PrescriptionStatus::Delivered => write!(f, "delivered"),
            PrescriptionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrescriptionRequest {
    pub consultation_id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub medications: Vec<Medication>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignPharmacyRequest {
    pub pharmacy_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimByQrRequest {
    pub qr_token: String,
    pub pharmacy_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentRequest {
    pub pharmacy_id: Uuid,
    pub status: PrescriptionStatus,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum PrescriptionError {
    #[error("Prescription not found")]
    NotFound,

    #[error("Invalid QR token")]
    InvalidQrToken,

    #[error("Consultation not found")]
    ConsultationNotFound,

    #[error("Consultation is not open for prescriptions: {0}")]
    ConsultationNotOpen(String),

    #[error("Actor is not a party to this prescription")]
    NotParty,

    #[error("Prescription already claimed by another pharmacy")]
    AlreadyClaimed,

    #[error("Only the assigned pharmacy may update fulfilment status")]
    NotAssignedPharmacy,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: PrescriptionStatus,
        to: PrescriptionStatus,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for PrescriptionError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => PrescriptionError::NotFound,
            other => PrescriptionError::DatabaseError(other.to_string()),
        }
    }
}
