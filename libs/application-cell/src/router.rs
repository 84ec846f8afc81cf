use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn application_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/provider", post(handlers::submit_provider_application))
        .route("/partner", post(handlers::submit_partner_application))
        .route("/pending", get(handlers::list_pending_applications))
        .route("/{application_id}/review", post(handlers::review_application))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
