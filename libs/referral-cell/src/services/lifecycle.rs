use tracing::{debug, info};
use uuid::Uuid;

use consultation_cell::models::Consultation;
use notification_cell::models::NotificationType;
use notification_cell::services::notify::{fan_out, notify};
use shared_database::DatabasePool;

use crate::models::{
    AvailableSpecialist, CreateReferralRequest, CreateReferralResponse, LifecycleAction, Referral,
    ReferralError, ReferralStatus,
};

pub struct ReferralLifecycleService {
    db: DatabasePool,
    fanout_limit: i64,
}

impl ReferralLifecycleService {
    pub fn new(db: DatabasePool, fanout_limit: i64) -> Self {
        Self { db, fanout_limit }
    }

    /// GP refers a patient to a specialization. Matching specialists are
    /// fanned out a notification; the patient is told immediately.
    pub async fn create_referral(
        &self,
        request: CreateReferralRequest,
    ) -> Result<CreateReferralResponse, ReferralError> {
        validate_create_request(&request)?;

        let mut tx = self.db.begin().await?;

        let patient: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE id = $1 AND role = 'patient'")
                .bind(request.patient_id)
                .fetch_optional(&mut *tx)
                .await?;
        if patient.is_none() {
            return Err(ReferralError::PatientNotFound);
        }

        let provider: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM users WHERE id = $1 AND role IN ('gp', 'specialist')",
        )
        .bind(request.referring_provider_id)
        .fetch_optional(&mut *tx)
        .await?;
        if provider.is_none() {
            return Err(ReferralError::ProviderNotFound);
        }

        let referral: Referral = sqlx::query_as(
            "INSERT INTO referrals \
               (id, patient_id, referring_provider_id, specialization, reason, status) \
             VALUES ($1, $2, $3, $4, $5, 'pending') \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(request.patient_id)
        .bind(request.referring_provider_id)
        .bind(request.specialization.trim())
        .bind(request.reason.trim())
        .fetch_one(&mut *tx)
        .await?;

        // Case-insensitive substring match on specialization, bounded like
        // every other fan-out query.
        let specialists: Vec<AvailableSpecialist> = sqlx::query_as(
            "SELECT id, name, specialization FROM users \
             WHERE role = 'specialist' AND specialization ILIKE '%' || $1 || '%' \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(referral.specialization.clone())
        .bind(self.fanout_limit)
        .fetch_all(&mut *tx)
        .await?;

        let recipients: Vec<Uuid> = specialists.iter().map(|s| s.id).collect();
        fan_out(
            &mut *tx,
            &recipients,
            NotificationType::ReferralCreated,
            "New referral request",
            &format!("A patient referral for {} awaits review", referral.specialization),
            Some(&format!("/referrals/{}", referral.id)),
        )
        .await?;

        notify(
            &mut *tx,
            referral.patient_id,
            NotificationType::ReferralCreated,
            "Referral created",
            &format!(
                "Your provider has referred you to a {} specialist",
                referral.specialization
            ),
            Some(&format!("/referrals/{}", referral.id)),
        )
        .await?;

        tx.commit().await?;

        info!(
            "Referral {} created, {} specialists notified",
            referral.id,
            recipients.len()
        );
        Ok(CreateReferralResponse {
            referral,
            available_specialists: specialists,
        })
    }

    /// Specialist accepts or declines. Accept locks the referral and spawns
    /// a pre-accepted specialist consultation; decline only notifies the
    /// referring provider and leaves the referral open for other
    /// specialists. The asymmetry is deliberate.
    pub async fn act_on_referral(
        &self,
        referral_id: Uuid,
        specialist_id: Uuid,
        action: LifecycleAction,
        notes: Option<String>,
    ) -> Result<(Referral, Option<Consultation>), ReferralError> {
        match action {
            LifecycleAction::Accept => self.accept(referral_id, specialist_id, notes).await,
            LifecycleAction::Decline => self
                .decline(referral_id, specialist_id, notes)
                .await
                .map(|referral| (referral, None)),
        }
    }

    async fn accept(
        &self,
        referral_id: Uuid,
        specialist_id: Uuid,
        notes: Option<String>,
    ) -> Result<(Referral, Option<Consultation>), ReferralError> {
        let mut tx = self.db.begin().await?;

        let updated: Option<Referral> = sqlx::query_as(
            "UPDATE referrals \
             SET specialist_id = $2, status = 'accepted', notes = COALESCE($3, notes), \
                 updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING *",
        )
        .bind(referral_id)
        .bind(specialist_id)
        .bind(notes)
        .fetch_optional(&mut *tx)
        .await?;

        let referral = match updated {
            Some(referral) => referral,
            None => {
                let status: Option<(ReferralStatus,)> =
                    sqlx::query_as("SELECT status FROM referrals WHERE id = $1")
                        .bind(referral_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return match status {
                    None => Err(ReferralError::NotFound),
                    Some((status,)) => Err(ReferralError::AlreadyResolved(status)),
                };
            }
        };

        // Acceptance spawns a consultation that is already assigned to the
        // accepting specialist.
        let consultation: Consultation = sqlx::query_as(
            "INSERT INTO consultations \
               (id, patient_id, provider_id, provider_type, chief_complaint, urgency, status, referral_id) \
             VALUES ($1, $2, $3, 'specialist', $4, 'routine', 'accepted', $5) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(referral.patient_id)
        .bind(specialist_id)
        .bind(format!("Referral: {}", referral.reason))
        .bind(referral.id)
        .fetch_one(&mut *tx)
        .await?;

        let referral: Referral = sqlx::query_as(
            "UPDATE referrals SET consultation_id = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(referral.id)
        .bind(consultation.id)
        .fetch_one(&mut *tx)
        .await?;

        notify(
            &mut *tx,
            referral.patient_id,
            NotificationType::ReferralAccepted,
            "Referral accepted",
            "A specialist has accepted your referral and opened a consultation",
            Some(&format!("/consultations/{}", consultation.id)),
        )
        .await?;
        notify(
            &mut *tx,
            referral.referring_provider_id,
            NotificationType::ReferralAccepted,
            "Referral accepted",
            "A specialist has accepted your patient referral",
            Some(&format!("/referrals/{}", referral.id)),
        )
        .await?;

        tx.commit().await?;

        info!(
            "Referral {} accepted by specialist {}, consultation {} created",
            referral.id, specialist_id, consultation.id
        );
        Ok((referral, Some(consultation)))
    }

    async fn decline(
        &self,
        referral_id: Uuid,
        specialist_id: Uuid,
        notes: Option<String>,
    ) -> Result<Referral, ReferralError> {
        let mut tx = self.db.begin().await?;

        // Decline does not mutate referral status: the request stays open
        // for any other matching specialist.
        let referral: Option<Referral> = sqlx::query_as("SELECT * FROM referrals WHERE id = $1")
            .bind(referral_id)
            .fetch_optional(&mut *tx)
            .await?;

        let referral = match referral {
            Some(referral) => referral,
            None => return Err(ReferralError::NotFound),
        };
        if referral.status != ReferralStatus::Pending {
            return Err(ReferralError::AlreadyResolved(referral.status));
        }

        let detail = notes
            .map(|n| format!(" Note: {}", n))
            .unwrap_or_default();
        notify(
            &mut *tx,
            referral.referring_provider_id,
            NotificationType::ReferralDeclined,
            "Referral declined",
            &format!(
                "A specialist declined your {} referral; it remains open for others.{}",
                referral.specialization, detail
            ),
            Some(&format!("/referrals/{}", referral.id)),
        )
        .await?;

        tx.commit().await?;

        debug!(
            "Referral {} declined by specialist {} (remains pending)",
            referral_id, specialist_id
        );
        Ok(referral)
    }

    pub async fn get_referral(&self, referral_id: Uuid) -> Result<Referral, ReferralError> {
        let referral: Option<Referral> = sqlx::query_as("SELECT * FROM referrals WHERE id = $1")
            .bind(referral_id)
            .fetch_optional(self.db.pool())
            .await?;

        referral.ok_or(ReferralError::NotFound)
    }

    /// Referrals the caller is party to: as patient, as referrer, as the
    /// accepting specialist, or as a candidate for the open pool.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        is_specialist: bool,
    ) -> Result<Vec<Referral>, ReferralError> {
        let referrals: Vec<Referral> = if is_specialist {
            sqlx::query_as(
                "SELECT * FROM referrals \
                 WHERE specialist_id = $1 OR status = 'pending' \
                 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(self.db.pool())
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM referrals \
                 WHERE patient_id = $1 OR referring_provider_id = $1 \
                 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(self.db.pool())
            .await?
        };

        Ok(referrals)
    }
}

fn validate_create_request(request: &CreateReferralRequest) -> Result<(), ReferralError> {
    if request.specialization.trim().is_empty() {
        return Err(ReferralError::ValidationError(
            "Specialization is required".to_string(),
        ));
    }
    if request.reason.trim().is_empty() {
        return Err(ReferralError::ValidationError(
            "Referral reason is required".to_string(),
        ));
    }
    Ok(())
}
