use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn consultation_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_consultation))
        .route("/", get(handlers::list_consultations))
        .route("/{consultation_id}", get(handlers::get_consultation))
        .route("/{consultation_id}/action", post(handlers::act_on_consultation))
        .route("/{consultation_id}/start", post(handlers::start_consultation))
        .route("/{consultation_id}/cancel", post(handlers::cancel_consultation))
        .route("/pool/{provider_type}", get(handlers::pending_pool))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
