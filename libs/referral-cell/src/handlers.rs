use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::AppState;
use shared_models::auth::AuthUser;
use shared_models::error::AppError;
use shared_models::roles::Role;

use crate::models::{CreateReferralRequest, ReferralActionRequest, ReferralError};
use crate::services::lifecycle::ReferralLifecycleService;

fn map_error(err: ReferralError) -> AppError {
    match err {
        ReferralError::NotFound => AppError::NotFound("Referral not found".to_string()),
        ReferralError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        ReferralError::ProviderNotFound => {
            AppError::NotFound("Referring provider not found".to_string())
        }
        ReferralError::AlreadyResolved(status) => AppError::Conflict(format!(
            "Referral already resolved (status: {})",
            status
        )),
        ReferralError::ValidationError(msg) => AppError::ValidationError(msg),
        ReferralError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn service(state: &AppState) -> ReferralLifecycleService {
    ReferralLifecycleService::new(state.db.clone(), state.config.fanout_limit)
}

#[axum::debug_handler]
pub async fn create_referral(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateReferralRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.role.is_provider() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only providers may create referrals".to_string(),
        ));
    }
    if request.referring_provider_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Providers may only refer as themselves".to_string(),
        ));
    }

    let response = service(&state)
        .create_referral(request)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "referral": response.referral,
        "available_specialists": response.available_specialists
    })))
}

#[axum::debug_handler]
pub async fn act_on_referral(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(referral_id): Path<Uuid>,
    Json(request): Json<ReferralActionRequest>,
) -> Result<Json<Value>, AppError> {
    if user.role != Role::Specialist && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only specialists may act on referrals".to_string(),
        ));
    }
    if request.specialist_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Specialists may only act as themselves".to_string(),
        ));
    }

    let (referral, consultation) = service(&state)
        .act_on_referral(referral_id, request.specialist_id, request.action, request.notes)
        .await
        .map_err(map_error)?;

    let mut body = json!({ "referral": referral });
    if let Some(consultation) = consultation {
        body["consultation"] = json!(consultation);
    }
    Ok(Json(body))
}

#[axum::debug_handler]
pub async fn get_referral(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(referral_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let referral = service(&state)
        .get_referral(referral_id)
        .await
        .map_err(map_error)?;

    let is_party = referral.patient_id == user.id
        || referral.referring_provider_id == user.id
        || referral.specialist_id == Some(user.id)
        || user.role == Role::Specialist;
    if !is_party && !user.is_admin() {
        return Err(AppError::Forbidden("Not a party to this referral".to_string()));
    }

    Ok(Json(json!({ "referral": referral })))
}

#[axum::debug_handler]
pub async fn list_referrals(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let referrals = service(&state)
        .list_for_user(user.id, user.role == Role::Specialist)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "referrals": referrals })))
}
