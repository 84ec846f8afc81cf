use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::AppState;
use shared_models::auth::AuthUser;
use shared_models::error::AppError;
use shared_models::roles::Role;

use crate::models::{
    ConsultationActionRequest, ConsultationError, CreateConsultationRequest,
};
use crate::services::lifecycle::ConsultationLifecycleService;

fn map_error(err: ConsultationError) -> AppError {
    match err {
        ConsultationError::NotFound => AppError::NotFound("Consultation not found".to_string()),
        ConsultationError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        ConsultationError::AlreadyResolved(status) => AppError::Conflict(format!(
            "Consultation already resolved by another provider (status: {})",
            status
        )),
        ConsultationError::InvalidStatusTransition(status) => AppError::Conflict(format!(
            "Consultation cannot be modified in current status: {}",
            status
        )),
        ConsultationError::ValidationError(msg) => AppError::ValidationError(msg),
        ConsultationError::Unauthorized => {
            AppError::Forbidden("Not a party to this consultation".to_string())
        }
        ConsultationError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn service(state: &AppState) -> ConsultationLifecycleService {
    ConsultationLifecycleService::new(state.db.clone(), state.config.fanout_limit)
}

#[axum::debug_handler]
pub async fn create_consultation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateConsultationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    debug!("Creating consultation for patient {}", request.patient_id);

    if request.patient_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to create a consultation for this patient".to_string(),
        ));
    }

    let consultation = service(&state)
        .create_consultation(request)
        .await
        .map_err(map_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "consultation": consultation })),
    ))
}

#[axum::debug_handler]
pub async fn act_on_consultation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(consultation_id): Path<Uuid>,
    Json(request): Json<ConsultationActionRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.role.is_provider() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only providers may act on consultation requests".to_string(),
        ));
    }
    if request.provider_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Providers may only act as themselves".to_string(),
        ));
    }

    let consultation = service(&state)
        .act_on_consultation(consultation_id, request.provider_id, request.action)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "consultation": consultation })))
}

#[axum::debug_handler]
pub async fn start_consultation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !user.role.is_provider() {
        return Err(AppError::Forbidden(
            "Only the assigned provider may start a consultation".to_string(),
        ));
    }

    let consultation = service(&state)
        .start_consultation(consultation_id, user.id)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "consultation": consultation })))
}

#[axum::debug_handler]
pub async fn cancel_consultation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let lifecycle = service(&state);

    let existing = lifecycle
        .get_consultation(consultation_id)
        .await
        .map_err(map_error)?;
    if existing.patient_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only the patient or an admin may cancel a consultation".to_string(),
        ));
    }

    let consultation = lifecycle
        .cancel_consultation(consultation_id)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "consultation": consultation })))
}

#[axum::debug_handler]
pub async fn get_consultation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let consultation = service(&state)
        .get_consultation(consultation_id)
        .await
        .map_err(map_error)?;

    let is_party = consultation.patient_id == user.id
        || consultation.provider_id == Some(user.id)
        || (consultation.status == crate::models::ConsultationStatus::Pending
            && consultation.provider_type == user.role);
    if !is_party && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not a party to this consultation".to_string(),
        ));
    }

    Ok(Json(json!({ "consultation": consultation })))
}

#[axum::debug_handler]
pub async fn list_consultations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let consultations = service(&state)
        .list_for_user(user.id, user.role)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "consultations": consultations })))
}

#[axum::debug_handler]
pub async fn pending_pool(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(provider_type): Path<Role>,
) -> Result<Json<Value>, AppError> {
    if user.role != provider_type && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Providers may only browse their own request pool".to_string(),
        ));
    }

    let consultations = service(&state)
        .pending_pool(provider_type)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "consultations": consultations })))
}
