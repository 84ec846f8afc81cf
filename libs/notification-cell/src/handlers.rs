use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::AppState;
use shared_models::auth::AuthUser;
use shared_models::error::AppError;

use crate::models::NotificationType;
use crate::services::notify::NotificationService;

#[derive(Debug, Deserialize)]
pub struct NotificationQueryParams {
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
    pub read: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<NotificationQueryParams>,
) -> Result<Json<Value>, AppError> {
    debug!("Listing notifications for user {}", user.id);

    let service = NotificationService::new(state.db.clone());
    let response = service
        .list(
            user.id,
            params.notification_type,
            params.read,
            params.limit.unwrap_or(50),
            params.offset.unwrap_or(0),
        )
        .await?;

    Ok(Json(json!({
        "notifications": response.notifications,
        "unread_count": response.unread_count
    })))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(state.db.clone());
    service.mark_read(user.id, notification_id).await?;

    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(state.db.clone());
    let updated = service.mark_all_read(user.id).await?;

    Ok(Json(json!({ "success": true, "updated": updated })))
}
