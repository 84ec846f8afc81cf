use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use application_cell::router::application_routes;
use auth_cell::router::auth_routes;
use consultation_cell::router::consultation_routes;
use diagnostic_cell::router::diagnostic_routes;
use notification_cell::router::notification_routes;
use prescription_cell::router::prescription_routes;
use referral_cell::router::referral_routes;
use shared_database::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "CareBridge API is running!" }))
        .route("/health", get(health).with_state(state.clone()))
        .nest("/auth", auth_routes(state.clone()))
        .nest("/applications", application_routes(state.clone()))
        .nest("/consultations", consultation_routes(state.clone()))
        .nest("/referrals", referral_routes(state.clone()))
        .nest("/prescriptions", prescription_routes(state.clone()))
        .nest("/diagnostic-orders", diagnostic_routes(state.clone()))
        .nest("/notifications", notification_routes(state))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let database = if state.db.is_healthy().await { "up" } else { "down" };
    Json(json!({ "status": "ok", "database": database }))
}
