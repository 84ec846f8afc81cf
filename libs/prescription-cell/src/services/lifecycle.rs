use rand::{distributions::Alphanumeric, Rng};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use notification_cell::models::NotificationType;
use notification_cell::services::notify::notify;
use shared_database::DatabasePool;

use crate::models::{
    CreatePrescriptionRequest, Prescription, PrescriptionError, PrescriptionStatus,
};

const QR_TOKEN_LEN: usize = 32;

/// Outcome of the pharmacy-claim compare-and-set.
enum ClaimOutcome {
    /// The claim won; pharmacy_id was null before this call.
    Claimed(Prescription),
    /// The same pharmacy already holds the claim. No-op, no notification.
    AlreadyOurs(Prescription),
}

pub struct PrescriptionLifecycleService {
    db: DatabasePool,
}

impl PrescriptionLifecycleService {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    /// Provider issues a prescription against one of their consultations.
    /// Issuing closes an in-progress consultation in the same transaction.
    pub async fn create_prescription(
        &self,
        request: CreatePrescriptionRequest,
    ) -> Result<Prescription, PrescriptionError> {
        validate_create_request(&request)?;

        let mut tx = self.db.begin().await?;

        let consultation: Option<(Uuid, Option<Uuid>, String)> = sqlx::query_as(
            "SELECT patient_id, provider_id, status FROM consultations WHERE id = $1",
        )
        .bind(request.consultation_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (patient_id, provider_id, status) = match consultation {
            Some(row) => row,
            None => return Err(PrescriptionError::ConsultationNotFound),
        };
        if patient_id != request.patient_id || provider_id != Some(request.provider_id) {
            return Err(PrescriptionError::NotParty);
        }
        if status != "accepted" && status != "in_progress" {
            return Err(PrescriptionError::ConsultationNotOpen(status));
        }

        let prescription: Prescription = sqlx::query_as(
            "INSERT INTO prescriptions \
               (id, consultation_id, patient_id, provider_id, qr_token, status, medications) \
             VALUES ($1, $2, $3, $4, $5, 'pending', $6) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(request.consultation_id)
        .bind(request.patient_id)
        .bind(request.provider_id)
        .bind(generate_qr_token())
        .bind(sqlx::types::Json(&request.medications))
        .fetch_one(&mut *tx)
        .await?;

        // The prescription concludes the visit; guard keeps a re-issued
        // prescription from touching an already-closed consultation.
        sqlx::query(
            "UPDATE consultations SET status = 'completed', updated_at = NOW() \
             WHERE id = $1 AND status = 'in_progress'",
        )
        .bind(request.consultation_id)
        .execute(&mut *tx)
        .await?;

        notify(
            &mut *tx,
            prescription.patient_id,
            NotificationType::PrescriptionCreated,
            "New prescription",
            "Your provider has issued a prescription. Assign a pharmacy or present the QR code at one.",
            Some(&format!("/prescriptions/{}", prescription.id)),
        )
        .await?;

        tx.commit().await?;

        info!(
            "Prescription {} issued for consultation {}",
            prescription.id, prescription.consultation_id
        );
        Ok(prescription)
    }

    /// Patient routes their prescription to a chosen pharmacy. First claim
    /// wins; re-assigning to the same pharmacy is a no-op.
    pub async fn assign_pharmacy(
        &self,
        prescription_id: Uuid,
        pharmacy_id: Uuid,
    ) -> Result<Prescription, PrescriptionError> {
        let mut tx = self.db.begin().await?;

        let pharmacy: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE id = $1 AND role = 'pharmacy'")
                .bind(pharmacy_id)
                .fetch_optional(&mut *tx)
                .await?;
        if pharmacy.is_none() {
            return Err(PrescriptionError::ValidationError(
                "Pharmacy not found".to_string(),
            ));
        }

        let prescription = match claim(&mut tx, prescription_id, pharmacy_id).await? {
            ClaimOutcome::AlreadyOurs(prescription) => prescription,
            ClaimOutcome::Claimed(prescription) => {
                notify(
                    &mut *tx,
                    pharmacy_id,
                    NotificationType::PrescriptionAssigned,
                    "Prescription assigned",
                    "A patient has routed a prescription to your pharmacy",
                    Some(&format!("/prescriptions/{}", prescription.id)),
                )
                .await?;
                prescription
            }
        };

        tx.commit().await?;

        debug!("Prescription {} assigned to pharmacy {}", prescription_id, pharmacy_id);
        Ok(prescription)
    }

    /// Pharmacy scans the patient's QR code. The claim shares its
    /// compare-and-set with direct assignment, so a walk-in scan and a
    /// portal assignment can never both win.
    pub async fn claim_by_qr(
        &self,
        qr_token: &str,
        pharmacy_id: Uuid,
    ) -> Result<Prescription, PrescriptionError> {
        let mut tx = self.db.begin().await?;

        // Token lookup never reveals whether a token exists for a
        // different pharmacy's claim; both map to the same error.
        let found: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM prescriptions WHERE qr_token = $1")
                .bind(qr_token)
                .fetch_optional(&mut *tx)
                .await?;
        let prescription_id = match found {
            Some((id,)) => id,
            None => return Err(PrescriptionError::InvalidQrToken),
        };

        let prescription = match claim(&mut tx, prescription_id, pharmacy_id).await? {
            ClaimOutcome::AlreadyOurs(prescription) => prescription,
            ClaimOutcome::Claimed(prescription) => {
                notify(
                    &mut *tx,
                    prescription.patient_id,
                    NotificationType::PrescriptionAssigned,
                    "Prescription claimed",
                    "A pharmacy has claimed your prescription and will prepare it",
                    Some(&format!("/prescriptions/{}", prescription.id)),
                )
                .await?;
                prescription
            }
        };

        tx.commit().await?;

        info!("Prescription {} claimed by pharmacy {}", prescription_id, pharmacy_id);
        Ok(prescription)
    }

    /// Assigned pharmacy moves fulfilment forward. The guarded update keeps
    /// two concurrent status writes from both landing.
    pub async fn update_fulfillment(
        &self,
        prescription_id: Uuid,
        pharmacy_id: Uuid,
        new_status: PrescriptionStatus,
    ) -> Result<Prescription, PrescriptionError> {
        let mut tx = self.db.begin().await?;

        let current: Option<Prescription> =
            sqlx::query_as("SELECT * FROM prescriptions WHERE id = $1")
                .bind(prescription_id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = match current {
            Some(prescription) => prescription,
            None => return Err(PrescriptionError::NotFound),
        };

        if current.pharmacy_id != Some(pharmacy_id) {
            return Err(PrescriptionError::NotAssignedPharmacy);
        }
        if !current.status.can_transition_to(new_status) {
            return Err(PrescriptionError::InvalidStatusTransition {
                from: current.status,
                to: new_status,
            });
        }

        let updated: Option<Prescription> = sqlx::query_as(
            "UPDATE prescriptions SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND pharmacy_id = $2 AND status = $4 \
             RETURNING *",
        )
        .bind(prescription_id)
        .bind(pharmacy_id)
        .bind(new_status)
        .bind(current.status)
        .fetch_optional(&mut *tx)
        .await?;

        let prescription = match updated {
            Some(prescription) => prescription,
            None => {
                // Lost a race with another status write.
                let actual: PrescriptionStatus =
                    sqlx::query_scalar("SELECT status FROM prescriptions WHERE id = $1")
                        .bind(prescription_id)
                        .fetch_one(&mut *tx)
                        .await?;
                return Err(PrescriptionError::InvalidStatusTransition {
                    from: actual,
                    to: new_status,
                });
            }
        };

        let (title, message) = match new_status {
            PrescriptionStatus::Preparing => (
                "Prescription in preparation",
                "Your pharmacy has started preparing your prescription".to_string(),
            ),
            PrescriptionStatus::Ready => (
                "Prescription ready",
                "Your prescription is ready for pickup".to_string(),
            ),
            PrescriptionStatus::Delivered => (
                "Prescription delivered",
                "Your prescription has been delivered".to_string(),
            ),
            other => (
                "Prescription update",
                format!("Your prescription is now {}", other),
            ),
        };
        notify(
            &mut *tx,
            prescription.patient_id,
            NotificationType::PrescriptionStatus,
            title,
            &message,
            Some(&format!("/prescriptions/{}", prescription.id)),
        )
        .await?;

        tx.commit().await?;

        info!(
            "Prescription {} moved to {} by pharmacy {}",
            prescription_id, new_status, pharmacy_id
        );
        Ok(prescription)
    }

    pub async fn get_prescription(
        &self,
        prescription_id: Uuid,
    ) -> Result<Prescription, PrescriptionError> {
        let prescription: Option<Prescription> =
            sqlx::query_as("SELECT * FROM prescriptions WHERE id = $1")
                .bind(prescription_id)
                .fetch_optional(self.db.pool())
                .await?;

        prescription.ok_or(PrescriptionError::NotFound)
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Prescription>, PrescriptionError> {
        let prescriptions: Vec<Prescription> = sqlx::query_as(
            "SELECT * FROM prescriptions \
             WHERE patient_id = $1 OR provider_id = $1 OR pharmacy_id = $1 \
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(prescriptions)
    }
}

/// Single compare-and-set shared by direct assignment and QR claim.
async fn claim(
    tx: &mut Transaction<'static, Postgres>,
    prescription_id: Uuid,
    pharmacy_id: Uuid,
) -> Result<ClaimOutcome, PrescriptionError> {
    let claimed: Option<Prescription> = sqlx::query_as(
        "UPDATE prescriptions SET pharmacy_id = $2, updated_at = NOW() \
         WHERE id = $1 AND pharmacy_id IS NULL \
         RETURNING *",
    )
    .bind(prescription_id)
    .bind(pharmacy_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(prescription) = claimed {
        return Ok(ClaimOutcome::Claimed(prescription));
    }

    // Zero rows: already claimed, or gone. Re-read to tell which.
    let existing: Option<Prescription> =
        sqlx::query_as("SELECT * FROM prescriptions WHERE id = $1")
            .bind(prescription_id)
            .fetch_optional(&mut **tx)
            .await?;
    match existing {
        None => Err(PrescriptionError::NotFound),
        Some(prescription) if prescription.pharmacy_id == Some(pharmacy_id) => {
            Ok(ClaimOutcome::AlreadyOurs(prescription))
        }
        Some(_) => Err(PrescriptionError::AlreadyClaimed),
    }
}

fn generate_qr_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(QR_TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn validate_create_request(request: &CreatePrescriptionRequest) -> Result<(), PrescriptionError> {
    if request.medications.is_empty() {
        return Err(PrescriptionError::ValidationError(
            "At least one medication is required".to_string(),
        ));
    }
    for medication in &request.medications {
        if medication.name.trim().is_empty() {
            return Err(PrescriptionError::ValidationError(
                "Medication name is required".to_string(),
            ));
        }
        if medication.dosage.trim().is_empty() {
            return Err(PrescriptionError::ValidationError(
                "Medication dosage is required".to_string(),
            ));
        }
    }
    Ok(())
}
