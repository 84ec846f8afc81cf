use tracing::{debug, info};
use uuid::Uuid;

use notification_cell::models::NotificationType;
use notification_cell::services::notify::{fan_out, notify};
use shared_database::DatabasePool;
use shared_models::roles::Role;

use crate::models::{
    Consultation, ConsultationError, ConsultationStatus, CreateConsultationRequest,
    LifecycleAction,
};

pub struct ConsultationLifecycleService {
    db: DatabasePool,
    fanout_limit: i64,
}

impl ConsultationLifecycleService {
    pub fn new(db: DatabasePool, fanout_limit: i64) -> Self {
        Self { db, fanout_limit }
    }

    /// Create a pending consultation and fan one notification out to every
    /// eligible provider of the requested type.
    pub async fn create_consultation(
        &self,
        request: CreateConsultationRequest,
    ) -> Result<Consultation, ConsultationError> {
        validate_create_request(&request)?;

        let mut tx = self.db.begin().await?;

        let patient_exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE id = $1 AND role = 'patient'")
                .bind(request.patient_id)
                .fetch_optional(&mut *tx)
                .await?;
        if patient_exists.is_none() {
            return Err(ConsultationError::PatientNotFound);
        }

        let consultation: Consultation = sqlx::query_as(
            "INSERT INTO consultations \
               (id, patient_id, provider_type, chief_complaint, urgency, status, consultation_fee) \
             VALUES ($1, $2, $3, $4, $5, 'pending', $6) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(request.patient_id)
        .bind(request.provider_type)
        .bind(request.chief_complaint.trim())
        .bind(request.urgency)
        .bind(request.consultation_fee)
        .fetch_one(&mut *tx)
        .await?;

        // Eligible pool is capacity-bounded: newest registered providers
        // first, never more than the configured fan-out limit.
        let providers: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM users WHERE role = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(request.provider_type)
        .bind(self.fanout_limit)
        .fetch_all(&mut *tx)
        .await?;

        let recipients: Vec<Uuid> = providers.into_iter().map(|(id,)| id).collect();
        let notified = fan_out(
            &mut *tx,
            &recipients,
            NotificationType::ConsultationRequest,
            "New consultation request",
            &format!(
                "A patient has requested a {} consultation ({} urgency)",
                consultation.provider_type, consultation.urgency
            ),
            Some(&format!("/consultations/{}", consultation.id)),
        )
        .await?;

        tx.commit().await?;

        info!(
            "Consultation {} created for patient {}, {} providers notified",
            consultation.id, consultation.patient_id, notified
        );
        Ok(consultation)
    }

    /// Provider accepts or declines a pending consultation. The status guard
    /// in the UPDATE is the optimistic-concurrency check: two providers
    /// racing on the same row leave exactly one winner, the loser sees the
    /// row already resolved.
    pub async fn act_on_consultation(
        &self,
        consultation_id: Uuid,
        provider_id: Uuid,
        action: LifecycleAction,
    ) -> Result<Consultation, ConsultationError> {
        let mut tx = self.db.begin().await?;

        let updated: Option<Consultation> = match action {
            LifecycleAction::Accept => {
                sqlx::query_as(
                    "UPDATE consultations \
                     SET provider_id = $2, status = 'accepted', updated_at = NOW() \
                     WHERE id = $1 AND status = 'pending' \
                     RETURNING *",
                )
                .bind(consultation_id)
                .bind(provider_id)
                .fetch_optional(&mut *tx)
                .await?
            }
            LifecycleAction::Decline => {
                sqlx::query_as(
                    "UPDATE consultations \
                     SET status = 'declined', updated_at = NOW() \
                     WHERE id = $1 AND status = 'pending' \
                     RETURNING *",
                )
                .bind(consultation_id)
                .fetch_optional(&mut *tx)
                .await?
            }
        };

        let consultation = match updated {
            Some(consultation) => consultation,
            None => {
                // Zero rows: either the id is unknown or another provider
                // resolved it first. Re-read once to tell the two apart.
                let status: Option<(ConsultationStatus,)> =
                    sqlx::query_as("SELECT status FROM consultations WHERE id = $1")
                        .bind(consultation_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return match status {
                    None => Err(ConsultationError::NotFound),
                    Some((status,)) => Err(ConsultationError::AlreadyResolved(status)),
                };
            }
        };

        let (notification_type, title, message) = match action {
            LifecycleAction::Accept => (
                NotificationType::ConsultationAccepted,
                "Consultation accepted",
                "A provider has accepted your consultation request".to_string(),
            ),
            LifecycleAction::Decline => (
                NotificationType::ConsultationDeclined,
                "Consultation declined",
                "Your consultation request was declined".to_string(),
            ),
        };
        notify(
            &mut *tx,
            consultation.patient_id,
            notification_type,
            title,
            &message,
            Some(&format!("/consultations/{}", consultation.id)),
        )
        .await?;

        tx.commit().await?;

        info!(
            "Consultation {} {} by provider {}",
            consultation_id,
            match action {
                LifecycleAction::Accept => "accepted",
                LifecycleAction::Decline => "declined",
            },
            provider_id
        );
        Ok(consultation)
    }

    /// The accepting provider opens the visit. A prescription issued against
    /// an in-progress consultation closes it as a side effect.
    pub async fn start_consultation(
        &self,
        consultation_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Consultation, ConsultationError> {
        let mut tx = self.db.begin().await?;

        let current: Option<Consultation> =
            sqlx::query_as("SELECT * FROM consultations WHERE id = $1")
                .bind(consultation_id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = match current {
            Some(consultation) => consultation,
            None => return Err(ConsultationError::NotFound),
        };

        if current.provider_id != Some(provider_id) {
            return Err(ConsultationError::Unauthorized);
        }
        if !current.status.can_transition_to(ConsultationStatus::InProgress) {
            return Err(ConsultationError::InvalidStatusTransition(current.status));
        }

        let updated: Option<Consultation> = sqlx::query_as(
            "UPDATE consultations \
             SET status = 'in_progress', updated_at = NOW() \
             WHERE id = $1 AND provider_id = $2 AND status = 'accepted' \
             RETURNING *",
        )
        .bind(consultation_id)
        .bind(provider_id)
        .fetch_optional(&mut *tx)
        .await?;

        let consultation = match updated {
            // Zero rows means a concurrent write moved the row after our read.
            None => return Err(ConsultationError::InvalidStatusTransition(current.status)),
            Some(consultation) => consultation,
        };

        notify(
            &mut *tx,
            consultation.patient_id,
            NotificationType::ConsultationStarted,
            "Consultation started",
            "Your provider has started the consultation",
            Some(&format!("/consultations/{}", consultation.id)),
        )
        .await?;

        tx.commit().await?;

        info!(
            "Consultation {} started by provider {}",
            consultation_id, provider_id
        );
        Ok(consultation)
    }

    /// Cancel a consultation that has not been resolved or completed. The
    /// assigned provider, if any, is notified in the same transaction.
    pub async fn cancel_consultation(
        &self,
        consultation_id: Uuid,
    ) -> Result<Consultation, ConsultationError> {
        let mut tx = self.db.begin().await?;

        let updated: Option<Consultation> = sqlx::query_as(
            "UPDATE consultations \
             SET status = 'cancelled', updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'accepted', 'in_progress') \
             RETURNING *",
        )
        .bind(consultation_id)
        .fetch_optional(&mut *tx)
        .await?;

        let consultation = match updated {
            Some(consultation) => consultation,
            None => {
                let status: Option<(ConsultationStatus,)> =
                    sqlx::query_as("SELECT status FROM consultations WHERE id = $1")
                        .bind(consultation_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return match status {
                    None => Err(ConsultationError::NotFound),
                    Some((status,)) => Err(ConsultationError::InvalidStatusTransition(status)),
                };
            }
        };

        if let Some(provider_id) = consultation.provider_id {
            notify(
                &mut *tx,
                provider_id,
                NotificationType::ConsultationCancelled,
                "Consultation cancelled",
                "A consultation assigned to you was cancelled",
                Some(&format!("/consultations/{}", consultation.id)),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(consultation)
    }

    pub async fn get_consultation(
        &self,
        consultation_id: Uuid,
    ) -> Result<Consultation, ConsultationError> {
        debug!("Fetching consultation: {}", consultation_id);

        let consultation: Option<Consultation> =
            sqlx::query_as("SELECT * FROM consultations WHERE id = $1")
                .bind(consultation_id)
                .fetch_optional(self.db.pool())
                .await?;

        consultation.ok_or(ConsultationError::NotFound)
    }

    /// Consultations the caller is party to, newest first.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        role: Role,
    ) -> Result<Vec<Consultation>, ConsultationError> {
        let consultations: Vec<Consultation> = if role == Role::Patient {
            sqlx::query_as(
                "SELECT * FROM consultations WHERE patient_id = $1 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(self.db.pool())
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM consultations WHERE provider_id = $1 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(self.db.pool())
            .await?
        };

        Ok(consultations)
    }

    /// Open pool of pending requests a provider of the given type may claim.
    pub async fn pending_pool(
        &self,
        provider_type: Role,
    ) -> Result<Vec<Consultation>, ConsultationError> {
        let consultations: Vec<Consultation> = sqlx::query_as(
            "SELECT * FROM consultations \
             WHERE provider_type = $1 AND status = 'pending' \
             ORDER BY created_at ASC",
        )
        .bind(provider_type)
        .fetch_all(self.db.pool())
        .await?;

        Ok(consultations)
    }
}

fn validate_create_request(request: &CreateConsultationRequest) -> Result<(), ConsultationError> {
    if request.chief_complaint.trim().is_empty() {
        return Err(ConsultationError::ValidationError(
            "Chief complaint is required".to_string(),
        ));
    }
    if !request.provider_type.is_provider() {
        return Err(ConsultationError::ValidationError(format!(
            "Invalid provider type: {}",
            request.provider_type
        )));
    }
    if let Some(fee) = request.consultation_fee {
        if fee < 0.0 {
            return Err(ConsultationError::ValidationError(
                "Consultation fee cannot be negative".to_string(),
            ));
        }
    }
    Ok(())
}
