use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

use shared_database::DatabasePool;
use shared_models::error::AppError;

use crate::models::{Notification, NotificationListResponse, NotificationType};

/// Insert one notification row on the caller's connection. Lifecycle
/// services call this with their open transaction so the row commits (or
/// rolls back) together with the state change it announces.
pub async fn notify(
    conn: &mut PgConnection,
    user_id: Uuid,
    notification_type: NotificationType,
    title: &str,
    message: &str,
    link: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO notifications (id, user_id, notification_type, title, message, link) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(notification_type)
    .bind(title)
    .bind(message)
    .bind(link)
    .execute(conn)
    .await?;

    debug!("Notification {} queued for user {}", notification_type, user_id);
    Ok(())
}

/// One row per recipient, same transaction. Recipient lists are already
/// capacity-bounded by the queries that produce them.
pub async fn fan_out(
    conn: &mut PgConnection,
    recipients: &[Uuid],
    notification_type: NotificationType,
    title: &str,
    message: &str,
    link: Option<&str>,
) -> Result<usize, sqlx::Error> {
    for recipient in recipients {
        notify(conn, *recipient, notification_type, title, message, link).await?;
    }
    Ok(recipients.len())
}

pub struct NotificationService {
    db: DatabasePool,
}

impl NotificationService {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        notification_type: Option<NotificationType>,
        read: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> Result<NotificationListResponse, AppError> {
        let notifications: Vec<Notification> = sqlx::query_as(
            "SELECT id, user_id, notification_type, title, message, link, is_read, created_at \
             FROM notifications \
             WHERE user_id = $1 \
               AND ($2::text IS NULL OR notification_type = $2) \
               AND ($3::boolean IS NULL OR is_read = $3) \
             ORDER BY created_at DESC \
             LIMIT $4 OFFSET $5",
        )
        .bind(user_id)
        .bind(notification_type.map(|t| t.to_string()))
        .bind(read)
        .bind(limit.clamp(1, 100))
        .bind(offset.max(0))
        .fetch_all(self.db.pool())
        .await?;

        let unread_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(NotificationListResponse {
            notifications,
            unread_count,
        })
    }

    /// Mark one notification read. Scoped to the owner, so another user's id
    /// simply finds nothing.
    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Notification not found".to_string()));
        }
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }
}
