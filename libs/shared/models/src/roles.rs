use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every account holds exactly one role. Role changes happen only through
/// admin action or application approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum Role {
    Patient,
    Gp,
    Specialist,
    Pharmacy,
    DiagnosticCenter,
    Admin,
}

impl Role {
    /// Roles that act as care providers for consultations.
    pub fn is_provider(&self) -> bool {
        matches!(self, Role::Gp | Role::Specialist)
    }

    /// Roles that fulfil prescriptions or diagnostic orders.
    pub fn is_partner(&self) -> bool {
        matches!(self, Role::Pharmacy | Role::DiagnosticCenter)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Patient => write!(f, "patient"),
            Role::Gp => write!(f, "gp"),
            Role::Specialist => write!(f, "specialist"),
            Role::Pharmacy => write!(f, "pharmacy"),
            Role::DiagnosticCenter => write!(f, "diagnostic_center"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Role::Patient),
            "gp" => Ok(Role::Gp),
            "specialist" => Ok(Role::Specialist),
            "pharmacy" => Ok(Role::Pharmacy),
            "diagnostic_center" => Ok(Role::DiagnosticCenter),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Urgency attached to consultations and diagnostic orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum Urgency {
    Routine,
    Urgent,
    Emergency,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::Routine => write!(f, "routine"),
            Urgency::Urgent => write!(f, "urgent"),
            Urgency::Emergency => write!(f, "emergency"),
        }
    }
}
