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

use crate::models::{
    AssignPharmacyRequest, ClaimByQrRequest, CreatePrescriptionRequest, FulfillmentRequest,
    PrescriptionError,
};
use crate::services::lifecycle::PrescriptionLifecycleService;

fn map_error(err: PrescriptionError) -> AppError {
    match err {
        PrescriptionError::NotFound => AppError::NotFound("Prescription not found".to_string()),
        PrescriptionError::InvalidQrToken => AppError::NotFound("Invalid QR token".to_string()),
        PrescriptionError::ConsultationNotFound => {
            AppError::NotFound("Consultation not found".to_string())
        }
        PrescriptionError::ConsultationNotOpen(status) => AppError::Conflict(format!(
            "Consultation is not open for prescriptions (status: {})",
            status
        )),
        PrescriptionError::NotParty => {
            AppError::Forbidden("Not a party to this prescription".to_string())
        }
        PrescriptionError::AlreadyClaimed => {
            AppError::Conflict("Prescription already claimed by another pharmacy".to_string())
        }
        PrescriptionError::NotAssignedPharmacy => AppError::Forbidden(
            "Only the assigned pharmacy may update fulfilment status".to_string(),
        ),
        PrescriptionError::InvalidStatusTransition { from, to } => {
            AppError::Conflict(format!("Invalid status transition: {} -> {}", from, to))
        }
        PrescriptionError::ValidationError(msg) => AppError::ValidationError(msg),
        PrescriptionError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn service(state: &AppState) -> PrescriptionLifecycleService {
    PrescriptionLifecycleService::new(state.db.clone())
}

#[axum::debug_handler]
pub async fn create_prescription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreatePrescriptionRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.role.is_provider() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only providers may issue prescriptions".to_string(),
        ));
    }
    if request.provider_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Providers may only prescribe as themselves".to_string(),
        ));
    }

    let prescription = service(&state)
        .create_prescription(request)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "prescription": prescription })))
}

#[axum::debug_handler]
pub async fn assign_pharmacy(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(prescription_id): Path<Uuid>,
    Json(request): Json<AssignPharmacyRequest>,
) -> Result<Json<Value>, AppError> {
    let service = service(&state);

    let prescription = service
        .get_prescription(prescription_id)
        .await
        .map_err(map_error)?;
    if prescription.patient_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only the patient may route their prescription".to_string(),
        ));
    }

    let prescription = service
        .assign_pharmacy(prescription_id, request.pharmacy_id)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "prescription": prescription })))
}

#[axum::debug_handler]
pub async fn claim_by_qr(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ClaimByQrRequest>,
) -> Result<Json<Value>, AppError> {
    if user.role != Role::Pharmacy && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only pharmacies may claim by QR code".to_string(),
        ));
    }
    if request.pharmacy_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Pharmacies may only claim as themselves".to_string(),
        ));
    }

    let prescription = service(&state)
        .claim_by_qr(request.qr_token.trim(), request.pharmacy_id)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "prescription": prescription })))
}

#[axum::debug_handler]
pub async fn update_fulfillment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(prescription_id): Path<Uuid>,
    Json(request): Json<FulfillmentRequest>,
) -> Result<Json<Value>, AppError> {
    if user.role != Role::Pharmacy && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only pharmacies may update fulfilment status".to_string(),
        ));
    }
    if request.pharmacy_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Pharmacies may only act as themselves".to_string(),
        ));
    }

    let prescription = service(&state)
        .update_fulfillment(prescription_id, request.pharmacy_id, request.status)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "prescription": prescription })))
}

#[axum::debug_handler]
pub async fn get_prescription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(prescription_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let prescription = service(&state)
        .get_prescription(prescription_id)
        .await
        .map_err(map_error)?;

    let is_party = prescription.patient_id == user.id
        || prescription.provider_id == user.id
        || prescription.pharmacy_id == Some(user.id);
    if !is_party && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not a party to this prescription".to_string(),
        ));
    }

    Ok(Json(json!({ "prescription": prescription })))
}

#[axum::debug_handler]
pub async fn list_prescriptions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let prescriptions = service(&state)
        .list_for_user(user.id)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "prescriptions": prescriptions })))
}
