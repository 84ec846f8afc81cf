use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tracing::debug;

use shared_database::AppState;
use shared_models::auth::TokenResponse;
use shared_models::error::AppError;
use shared_utils::jwt::validate_token;

use crate::models::{AuthError, LoginRequest, SignupRequest};
use crate::services::account::AccountService;

fn map_error(err: AuthError) -> AppError {
    match err {
        AuthError::EmailTaken => AppError::Conflict("Email already registered".to_string()),
        AuthError::InvalidCredentials => AppError::Auth("Invalid email or password".to_string()),
        AuthError::ValidationError(msg) => AppError::ValidationError(msg),
        AuthError::Internal(msg) => AppError::Internal(msg),
        AuthError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn service(state: &AppState) -> AccountService {
    AccountService::new(state.db.clone(), state.config.jwt_secret.clone())
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    if !auth_value.starts_with("Bearer ") {
        return Err(AppError::Auth(
            "Invalid authorization header format".to_string(),
        ));
    }

    Ok(auth_value[7..].to_string())
}

#[axum::debug_handler]
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let response = service(&state).signup(request).await.map_err(map_error)?;

    Ok((StatusCode::CREATED, Json(json!(response))))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let (token, account) = service(&state).login(request).await.map_err(map_error)?;

    Ok(Json(json!({ "token": token, "user": account })))
}

#[axum::debug_handler]
pub async fn validate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let token = extract_bearer_token(&headers)?;

    match validate_token(&token, &state.config.jwt_secret) {
        Ok(user) => Ok(Json(TokenResponse {
            valid: true,
            user_id: user.id,
            email: user.email,
            role: Some(user.role.to_string()),
        })),
        Err(err) => Err(AppError::Auth(err)),
    }
}
