use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn diagnostic_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/create", post(handlers::create_order))
        .route("/", get(handlers::list_orders))
        .route("/{order_id}", get(handlers::get_order))
        .route("/{order_id}/update-status", post(handlers::update_status))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
