use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::AppState;
use shared_models::auth::AuthUser;
use shared_models::error::AppError;

use crate::models::{
    ApplicationError, PartnerApplicationRequest, ProviderApplicationRequest, ReviewRequest,
};
use crate::services::review::ApplicationService;

fn map_error(err: ApplicationError) -> AppError {
    match err {
        ApplicationError::NotFound => AppError::NotFound("Application not found".to_string()),
        ApplicationError::AlreadyPending => {
            AppError::Conflict("An application is already pending for this user".to_string())
        }
        ApplicationError::AlreadyReviewed(status) => {
            AppError::Conflict(format!("Application already reviewed (status: {})", status))
        }
        ApplicationError::ValidationError(msg) => AppError::ValidationError(msg),
        ApplicationError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn service(state: &AppState) -> ApplicationService {
    ApplicationService::new(state.db.clone())
}

#[axum::debug_handler]
pub async fn submit_provider_application(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ProviderApplicationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let application = service(&state)
        .submit_provider(user.id, request)
        .await
        .map_err(map_error)?;

    Ok((StatusCode::CREATED, Json(json!({ "application": application }))))
}

#[axum::debug_handler]
pub async fn submit_partner_application(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<PartnerApplicationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let application = service(&state)
        .submit_partner(user.id, request)
        .await
        .map_err(map_error)?;

    Ok((StatusCode::CREATED, Json(json!({ "application": application }))))
}

#[axum::debug_handler]
pub async fn list_pending_applications(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only admins may list applications".to_string(),
        ));
    }

    let applications = service(&state).list_pending().await.map_err(map_error)?;

    Ok(Json(json!({ "applications": applications })))
}

#[axum::debug_handler]
pub async fn review_application(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(application_id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only admins may review applications".to_string(),
        ));
    }

    let application = service(&state)
        .review(application_id, request)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "application": application })))
}
