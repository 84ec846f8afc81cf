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
use shared_models::roles::Role;

use crate::models::{CreateOrderRequest, DiagnosticError, UpdateStatusRequest};
use crate::services::lifecycle::DiagnosticLifecycleService;

fn map_error(err: DiagnosticError) -> AppError {
    match err {
        DiagnosticError::NotFound => AppError::NotFound("Diagnostic order not found".to_string()),
        DiagnosticError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        DiagnosticError::DoctorNotFound => {
            AppError::NotFound("Ordering doctor not found".to_string())
        }
        DiagnosticError::CenterNotFound => {
            AppError::NotFound("Diagnostic center not found".to_string())
        }
        DiagnosticError::AlreadyClaimed => {
            AppError::Conflict("Order already claimed by another diagnostic center".to_string())
        }
        DiagnosticError::InvalidStatusTransition { from, to } => {
            AppError::Conflict(format!("Invalid status transition: {} -> {}", from, to))
        }
        DiagnosticError::ValidationError(msg) => AppError::ValidationError(msg),
        DiagnosticError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn service(state: &AppState) -> DiagnosticLifecycleService {
    DiagnosticLifecycleService::new(state.db.clone(), state.config.fanout_limit)
}

#[axum::debug_handler]
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if !user.role.is_provider() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only providers may order diagnostic tests".to_string(),
        ));
    }
    if request.doctor_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Providers may only order as themselves".to_string(),
        ));
    }

    let order = service(&state).create_order(request).await.map_err(map_error)?;

    Ok((StatusCode::CREATED, Json(json!({ "order": order }))))
}

#[axum::debug_handler]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    if user.role != Role::DiagnosticCenter && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only diagnostic centers may update orders".to_string(),
        ));
    }
    if request.diagnostic_center_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Centers may only act as themselves".to_string(),
        ));
    }

    let order = service(&state)
        .update_status(order_id, request)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "order": order })))
}

#[axum::debug_handler]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let order = service(&state).get_order(order_id).await.map_err(map_error)?;

    let is_party = order.patient_id == user.id
        || order.doctor_id == user.id
        || order.diagnostic_center_id == Some(user.id)
        || (user.role == Role::DiagnosticCenter && order.diagnostic_center_id.is_none());
    if !is_party && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not a party to this diagnostic order".to_string(),
        ));
    }

    Ok(Json(json!({ "order": order })))
}

#[axum::debug_handler]
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let orders = service(&state)
        .list_for_user(user.id, user.role == Role::DiagnosticCenter)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "orders": orders })))
}
