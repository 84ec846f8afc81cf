use tracing::info;
use uuid::Uuid;

use notification_cell::models::NotificationType;
use notification_cell::services::notify::{fan_out, notify};
use shared_database::DatabasePool;

use crate::models::{
    CreateOrderRequest, DiagnosticError, DiagnosticOrder, DiagnosticOrderStatus,
    UpdateStatusRequest,
};

pub struct DiagnosticLifecycleService {
    db: DatabasePool,
    fanout_limit: i64,
}

impl DiagnosticLifecycleService {
    pub fn new(db: DatabasePool, fanout_limit: i64) -> Self {
        Self { db, fanout_limit }
    }

    /// Doctor orders tests for a patient. A named center is notified
    /// directly; otherwise the order fans out to all centers.
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<DiagnosticOrder, DiagnosticError> {
        validate_create_request(&request)?;

        let mut tx = self.db.begin().await?;

        let patient: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE id = $1 AND role = 'patient'")
                .bind(request.patient_id)
                .fetch_optional(&mut *tx)
                .await?;
        if patient.is_none() {
            return Err(DiagnosticError::PatientNotFound);
        }

        let doctor: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM users WHERE id = $1 AND role IN ('gp', 'specialist')",
        )
        .bind(request.doctor_id)
        .fetch_optional(&mut *tx)
        .await?;
        if doctor.is_none() {
            return Err(DiagnosticError::DoctorNotFound);
        }

        if let Some(center_id) = request.diagnostic_center_id {
            let center: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM users WHERE id = $1 AND role = 'diagnostic_center'")
                    .bind(center_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if center.is_none() {
                return Err(DiagnosticError::CenterNotFound);
            }
        }

        let test_types: Vec<String> = request
            .test_types
            .iter()
            .map(|t| t.trim().to_string())
            .collect();

        let order: DiagnosticOrder = sqlx::query_as(
            "INSERT INTO diagnostic_orders \
               (id, patient_id, doctor_id, diagnostic_center_id, test_types, urgency, status) \
             VALUES ($1, $2, $3, $4, $5, $6, 'pending') \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(request.patient_id)
        .bind(request.doctor_id)
        .bind(request.diagnostic_center_id)
        .bind(&test_types)
        .bind(request.urgency)
        .fetch_one(&mut *tx)
        .await?;

        let summary = order.test_types.join(", ");
        let link = format!("/diagnostic-orders/{}", order.id);
        match order.diagnostic_center_id {
            Some(center_id) => {
                notify(
                    &mut *tx,
                    center_id,
                    NotificationType::DiagnosticOrderCreated,
                    "New diagnostic order",
                    &format!("A doctor has ordered tests at your center: {}", summary),
                    Some(&link),
                )
                .await?;
            }
            None => {
                let centers: Vec<(Uuid,)> = sqlx::query_as(
                    "SELECT id FROM users WHERE role = 'diagnostic_center' \
                     ORDER BY created_at DESC LIMIT $1",
                )
                .bind(self.fanout_limit)
                .fetch_all(&mut *tx)
                .await?;
                let recipients: Vec<Uuid> = centers.into_iter().map(|(id,)| id).collect();
                fan_out(
                    &mut *tx,
                    &recipients,
                    NotificationType::DiagnosticOrderCreated,
                    "New diagnostic order",
                    &format!("An open diagnostic order awaits a center: {}", summary),
                    Some(&link),
                )
                .await?;
            }
        }

        notify(
            &mut *tx,
            order.patient_id,
            NotificationType::DiagnosticOrderCreated,
            "Diagnostic tests ordered",
            &format!("Your doctor has ordered tests: {}", summary),
            Some(&link),
        )
        .await?;

        tx.commit().await?;

        info!("Diagnostic order {} created ({})", order.id, summary);
        Ok(order)
    }

    /// Center writes a status. The first write claims the order; any other
    /// center is rejected from then on. Each status branch runs its own
    /// fixed parameterized statement.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        request: UpdateStatusRequest,
    ) -> Result<DiagnosticOrder, DiagnosticError> {
        let center_id = request.diagnostic_center_id;
        let mut tx = self.db.begin().await?;

        let current: Option<DiagnosticOrder> =
            sqlx::query_as("SELECT * FROM diagnostic_orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = match current {
            Some(order) => order,
            None => return Err(DiagnosticError::NotFound),
        };

        if let Some(owner) = current.diagnostic_center_id {
            if owner != center_id {
                return Err(DiagnosticError::AlreadyClaimed);
            }
        }
        if !current.status.can_transition_to(request.status) {
            return Err(DiagnosticError::InvalidStatusTransition {
                from: current.status,
                to: request.status,
            });
        }

        let updated = match request.status {
            DiagnosticOrderStatus::Scheduled => {
                let (date, time) = match (request.scheduled_date, request.scheduled_time) {
                    (Some(date), Some(time)) => (date, time),
                    _ => {
                        return Err(DiagnosticError::ValidationError(
                            "Scheduling requires a date and a time".to_string(),
                        ))
                    }
                };
                sqlx::query_as::<_, DiagnosticOrder>(
                    "UPDATE diagnostic_orders \
                     SET diagnostic_center_id = $2, status = 'scheduled', \
                         scheduled_date = $3, scheduled_time = $4, \
                         notes = COALESCE($5, notes), updated_at = NOW() \
                     WHERE id = $1 AND status = $6 \
                       AND (diagnostic_center_id IS NULL OR diagnostic_center_id = $2) \
                     RETURNING *",
                )
                .bind(order_id)
                .bind(center_id)
                .bind(date)
                .bind(time)
                .bind(request.notes.as_deref())
                .bind(current.status)
                .fetch_optional(&mut *tx)
                .await?
            }
            DiagnosticOrderStatus::Completed => {
                let results_url = match request.results_url.as_deref() {
                    Some(url) if !url.trim().is_empty() => url,
                    _ => {
                        return Err(DiagnosticError::ValidationError(
                            "Completion requires a results URL".to_string(),
                        ))
                    }
                };
                sqlx::query_as::<_, DiagnosticOrder>(
                    "UPDATE diagnostic_orders \
                     SET diagnostic_center_id = $2, status = 'completed', \
                         results_url = $3, notes = COALESCE($4, notes), updated_at = NOW() \
                     WHERE id = $1 AND status = $5 \
                       AND (diagnostic_center_id IS NULL OR diagnostic_center_id = $2) \
                     RETURNING *",
                )
                .bind(order_id)
                .bind(center_id)
                .bind(results_url)
                .bind(request.notes.as_deref())
                .bind(current.status)
                .fetch_optional(&mut *tx)
                .await?
            }
            DiagnosticOrderStatus::SampleCollected
            | DiagnosticOrderStatus::InProgress
            | DiagnosticOrderStatus::Cancelled => {
                sqlx::query_as::<_, DiagnosticOrder>(
                    "UPDATE diagnostic_orders \
                     SET diagnostic_center_id = $2, status = $3, \
                         notes = COALESCE($4, notes), updated_at = NOW() \
                     WHERE id = $1 AND status = $5 \
                       AND (diagnostic_center_id IS NULL OR diagnostic_center_id = $2) \
                     RETURNING *",
                )
                .bind(order_id)
                .bind(center_id)
                .bind(request.status)
                .bind(request.notes.as_deref())
                .bind(current.status)
                .fetch_optional(&mut *tx)
                .await?
            }
            DiagnosticOrderStatus::Pending => {
                return Err(DiagnosticError::InvalidStatusTransition {
                    from: current.status,
                    to: request.status,
                })
            }
        };

        let order = match updated {
            Some(order) => order,
            None => {
                // Zero rows: another center claimed the order, or a concurrent
                // status write from this center landed first. Re-read once to
                // tell the two apart.
                let row: Option<(Option<Uuid>, DiagnosticOrderStatus)> = sqlx::query_as(
                    "SELECT diagnostic_center_id, status FROM diagnostic_orders WHERE id = $1",
                )
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?;
                return match row {
                    None => Err(DiagnosticError::NotFound),
                    Some((Some(owner), _)) if owner != center_id => {
                        Err(DiagnosticError::AlreadyClaimed)
                    }
                    Some((_, status)) => Err(DiagnosticError::InvalidStatusTransition {
                        from: status,
                        to: request.status,
                    }),
                };
            }
        };

        let (notification_type, title, message) = match order.status {
            DiagnosticOrderStatus::Scheduled => (
                NotificationType::DiagnosticOrderScheduled,
                "Diagnostic tests scheduled",
                format!(
                    "Tests scheduled for {} at {}",
                    order.scheduled_date.map(|d| d.to_string()).unwrap_or_default(),
                    order.scheduled_time.map(|t| t.to_string()).unwrap_or_default()
                ),
            ),
            DiagnosticOrderStatus::Completed => (
                NotificationType::DiagnosticOrderCompleted,
                "Diagnostic results ready",
                "Test results are available".to_string(),
            ),
            other => (
                NotificationType::DiagnosticOrderStatus,
                "Diagnostic order update",
                format!("Diagnostic order is now {}", other),
            ),
        };
        for recipient in [order.patient_id, order.doctor_id] {
            notify(
                &mut *tx,
                recipient,
                notification_type,
                title,
                &message,
                Some(&format!("/diagnostic-orders/{}", order.id)),
            )
            .await?;
        }

        tx.commit().await?;

        info!(
            "Diagnostic order {} moved to {} by center {}",
            order.id, order.status, center_id
        );
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<DiagnosticOrder, DiagnosticError> {
        let order: Option<DiagnosticOrder> =
            sqlx::query_as("SELECT * FROM diagnostic_orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(self.db.pool())
                .await?;

        order.ok_or(DiagnosticError::NotFound)
    }

    /// Orders the caller is party to; centers also see the unclaimed pool.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        is_center: bool,
    ) -> Result<Vec<DiagnosticOrder>, DiagnosticError> {
        let orders: Vec<DiagnosticOrder> = if is_center {
            sqlx::query_as(
                "SELECT * FROM diagnostic_orders \
                 WHERE diagnostic_center_id = $1 OR diagnostic_center_id IS NULL \
                 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(self.db.pool())
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM diagnostic_orders \
                 WHERE patient_id = $1 OR doctor_id = $1 \
                 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(self.db.pool())
            .await?
        };

        Ok(orders)
    }
}

fn validate_create_request(request: &CreateOrderRequest) -> Result<(), DiagnosticError> {
    if request.test_types.is_empty() {
        return Err(DiagnosticError::ValidationError(
            "At least one test type is required".to_string(),
        ));
    }
    if request.test_types.iter().any(|t| t.trim().is_empty()) {
        return Err(DiagnosticError::ValidationError(
            "Test types must not be blank".to_string(),
        ));
    }
    Ok(())
}
