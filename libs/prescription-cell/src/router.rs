use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn prescription_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/create", post(handlers::create_prescription))
        .route("/", get(handlers::list_prescriptions))
        .route("/claim-qr", post(handlers::claim_by_qr))
        .route("/{prescription_id}", get(handlers::get_prescription))
        .route("/{prescription_id}/assign-pharmacy", post(handlers::assign_pharmacy))
        .route("/{prescription_id}/fulfill", post(handlers::update_fulfillment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
