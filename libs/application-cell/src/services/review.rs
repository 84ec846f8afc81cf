use sqlx::PgConnection;
use tracing::info;
use uuid::Uuid;

use notification_cell::models::NotificationType;
use notification_cell::services::notify::notify;
use shared_database::DatabasePool;
use shared_models::roles::Role;

use crate::models::{
    Application, ApplicationError, ApplicationStatus, PartnerApplication,
    PartnerApplicationRequest, ProviderApplication, ProviderApplicationRequest, ReviewAction,
    ReviewRequest,
};

pub struct ApplicationService {
    db: DatabasePool,
}

impl ApplicationService {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    /// User applies for a provider role (gp or specialist). One open
    /// application per user across both application kinds.
    pub async fn submit_provider(
        &self,
        user_id: Uuid,
        request: ProviderApplicationRequest,
    ) -> Result<ProviderApplication, ApplicationError> {
        validate_provider_request(&request)?;

        let mut tx = self.db.begin().await?;
        ensure_no_pending(&mut tx, user_id).await?;

        let application: ProviderApplication = sqlx::query_as(
            "INSERT INTO provider_applications \
               (id, user_id, requested_role, license_number, specialization, status) \
             VALUES ($1, $2, $3, $4, $5, 'pending') \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(request.requested_role)
        .bind(request.license_number.trim())
        .bind(request.specialization.as_deref().map(str::trim))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "Provider application {} submitted by user {} for role {}",
            application.id, user_id, application.requested_role
        );
        Ok(application)
    }

    /// User applies for a partner role (pharmacy or diagnostic center).
    pub async fn submit_partner(
        &self,
        user_id: Uuid,
        request: PartnerApplicationRequest,
    ) -> Result<PartnerApplication, ApplicationError> {
        validate_partner_request(&request)?;

        let mut tx = self.db.begin().await?;
        ensure_no_pending(&mut tx, user_id).await?;

        let application: PartnerApplication = sqlx::query_as(
            "INSERT INTO partner_applications \
               (id, user_id, requested_role, business_name, address, license_number, status) \
             VALUES ($1, $2, $3, $4, $5, $6, 'pending') \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(request.requested_role)
        .bind(request.business_name.trim())
        .bind(request.address.trim())
        .bind(request.license_number.trim())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "Partner application {} submitted by user {} for role {}",
            application.id, user_id, application.requested_role
        );
        Ok(application)
    }

    /// Admin approves or rejects. Approval flips the user's role in the
    /// same transaction; rejection records the reason. Both notify the
    /// applicant.
    pub async fn review(
        &self,
        application_id: Uuid,
        request: ReviewRequest,
    ) -> Result<Application, ApplicationError> {
        if request.action == ReviewAction::Reject
            && request.reason.as_deref().map_or(true, |r| r.trim().is_empty())
        {
            return Err(ApplicationError::ValidationError(
                "Rejection requires a reason".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        let new_status = match request.action {
            ReviewAction::Approve => ApplicationStatus::Approved,
            ReviewAction::Reject => ApplicationStatus::Rejected,
        };
        let reason = request.reason.as_deref().map(str::trim);

        // The id lives in exactly one of the two tables.
        let provider: Option<ProviderApplication> = sqlx::query_as(
            "UPDATE provider_applications \
             SET status = $2, rejection_reason = $3, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING *",
        )
        .bind(application_id)
        .bind(new_status)
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await?;

        let application = match provider {
            Some(application) => Application::Provider(application),
            None => {
                let partner: Option<PartnerApplication> = sqlx::query_as(
                    "UPDATE partner_applications \
                     SET status = $2, rejection_reason = $3, updated_at = NOW() \
                     WHERE id = $1 AND status = 'pending' \
                     RETURNING *",
                )
                .bind(application_id)
                .bind(new_status)
                .bind(reason)
                .fetch_optional(&mut *tx)
                .await?;
                match partner {
                    Some(application) => Application::Partner(application),
                    None => return Err(self.resolve_miss(application_id).await?),
                }
            }
        };

        match request.action {
            ReviewAction::Approve => {
                sqlx::query("UPDATE users SET role = $2 WHERE id = $1")
                    .bind(application.user_id())
                    .bind(application.requested_role())
                    .execute(&mut *tx)
                    .await?;
                if let Application::Provider(provider) = &application {
                    if let Some(specialization) = provider.specialization.as_deref() {
                        sqlx::query("UPDATE users SET specialization = $2 WHERE id = $1")
                            .bind(provider.user_id)
                            .bind(specialization)
                            .execute(&mut *tx)
                            .await?;
                    }
                }
                notify(
                    &mut *tx,
                    application.user_id(),
                    NotificationType::ApplicationApproved,
                    "Application approved",
                    &format!(
                        "Your application has been approved; your account is now a {}",
                        application.requested_role()
                    ),
                    None,
                )
                .await?;
            }
            ReviewAction::Reject => {
                notify(
                    &mut *tx,
                    application.user_id(),
                    NotificationType::ApplicationRejected,
                    "Application rejected",
                    &format!(
                        "Your application was rejected: {}",
                        reason.unwrap_or_default()
                    ),
                    None,
                )
                .await?;
            }
        }

        tx.commit().await?;

        info!(
            "Application {} reviewed: {}",
            application_id,
            application.status()
        );
        Ok(application)
    }

    /// Zero rows from the guarded review update: reviewed already, or no
    /// such application.
    async fn resolve_miss(
        &self,
        application_id: Uuid,
    ) -> Result<ApplicationError, ApplicationError> {
        let provider: Option<(ApplicationStatus,)> =
            sqlx::query_as("SELECT status FROM provider_applications WHERE id = $1")
                .bind(application_id)
                .fetch_optional(self.db.pool())
                .await?;
        if let Some((status,)) = provider {
            return Ok(ApplicationError::AlreadyReviewed(status));
        }
        let partner: Option<(ApplicationStatus,)> =
            sqlx::query_as("SELECT status FROM partner_applications WHERE id = $1")
                .bind(application_id)
                .fetch_optional(self.db.pool())
                .await?;
        match partner {
            Some((status,)) => Ok(ApplicationError::AlreadyReviewed(status)),
            None => Ok(ApplicationError::NotFound),
        }
    }

    pub async fn list_pending(&self) -> Result<Vec<Application>, ApplicationError> {
        let providers: Vec<ProviderApplication> = sqlx::query_as(
            "SELECT * FROM provider_applications WHERE status = 'pending' \
             ORDER BY created_at ASC",
        )
        .fetch_all(self.db.pool())
        .await?;
        let partners: Vec<PartnerApplication> = sqlx::query_as(
            "SELECT * FROM partner_applications WHERE status = 'pending' \
             ORDER BY created_at ASC",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(providers
            .into_iter()
            .map(Application::Provider)
            .chain(partners.into_iter().map(Application::Partner))
            .collect())
    }
}

fn validate_provider_request(
    request: &ProviderApplicationRequest,
) -> Result<(), ApplicationError> {
    if !request.requested_role.is_provider() {
        return Err(ApplicationError::ValidationError(
            "Provider applications may only request gp or specialist".to_string(),
        ));
    }
    if request.license_number.trim().is_empty() {
        return Err(ApplicationError::ValidationError(
            "License number is required".to_string(),
        ));
    }
    if request.requested_role == Role::Specialist
        && request.specialization.as_deref().map_or(true, |s| s.trim().is_empty())
    {
        return Err(ApplicationError::ValidationError(
            "Specialist applications require a specialization".to_string(),
        ));
    }
    Ok(())
}

fn validate_partner_request(request: &PartnerApplicationRequest) -> Result<(), ApplicationError> {
    if !request.requested_role.is_partner() {
        return Err(ApplicationError::ValidationError(
            "Partner applications may only request pharmacy or diagnostic_center".to_string(),
        ));
    }
    for (field, value) in [
        ("Business name", &request.business_name),
        ("Address", &request.address),
        ("License number", &request.license_number),
    ] {
        if value.trim().is_empty() {
            return Err(ApplicationError::ValidationError(format!(
                "{} is required",
                field
            )));
        }
    }
    Ok(())
}

async fn ensure_no_pending(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<(), ApplicationError> {
    let pending: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM provider_applications WHERE user_id = $1 AND status = 'pending' \
         UNION ALL \
         SELECT id FROM partner_applications WHERE user_id = $1 AND status = 'pending' \
         LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    if pending.is_some() {
        return Err(ApplicationError::AlreadyPending);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_request_rejects_partner_role() {
        let request = ProviderApplicationRequest {
            requested_role: Role::Pharmacy,
            license_number: "LIC-1".to_string(),
            specialization: None,
        };
        assert!(matches!(
            validate_provider_request(&request),
            Err(ApplicationError::ValidationError(_))
        ));
    }

    #[test]
    fn specialist_request_requires_specialization() {
        let mut request = ProviderApplicationRequest {
            requested_role: Role::Specialist,
            license_number: "LIC-2".to_string(),
            specialization: None,
        };
        assert!(validate_provider_request(&request).is_err());
        request.specialization = Some("Cardiology".to_string());
        assert!(validate_provider_request(&request).is_ok());
    }

    #[test]
    fn gp_request_needs_no_specialization() {
        let request = ProviderApplicationRequest {
            requested_role: Role::Gp,
            license_number: "LIC-3".to_string(),
            specialization: None,
        };
        assert!(validate_provider_request(&request).is_ok());
    }

    #[test]
    fn partner_request_rejects_provider_role() {
        let request = PartnerApplicationRequest {
            requested_role: Role::Gp,
            business_name: "City Pharmacy".to_string(),
            address: "1 Main St".to_string(),
            license_number: "PH-1".to_string(),
        };
        assert!(matches!(
            validate_partner_request(&request),
            Err(ApplicationError::ValidationError(_))
        ));
    }

    #[test]
    fn partner_request_rejects_blank_fields() {
        let request = PartnerApplicationRequest {
            requested_role: Role::DiagnosticCenter,
            business_name: "  ".to_string(),
            address: "1 Main St".to_string(),
            license_number: "DC-1".to_string(),
        };
        assert!(validate_partner_request(&request).is_err());
    }
}
