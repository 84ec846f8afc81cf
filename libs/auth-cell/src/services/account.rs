use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};
use uuid::Uuid;

use shared_database::DatabasePool;
use shared_models::auth::{AuthUser, UserAccount};
use shared_models::roles::Role;
use shared_utils::jwt::issue_token;

use crate::models::{AuthError, LoginRequest, SignupRequest, SignupResponse};

const MIN_PASSWORD_LEN: usize = 8;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"))
}

pub struct AccountService {
    db: DatabasePool,
    jwt_secret: String,
}

impl AccountService {
    pub fn new(db: DatabasePool, jwt_secret: String) -> Self {
        Self { db, jwt_secret }
    }

    /// Role-based signup. Provider and partner roles are stored as patient;
    /// they gain their role through an approved application.
    pub async fn signup(&self, request: SignupRequest) -> Result<SignupResponse, AuthError> {
        validate_signup(&request)?;

        let email = request.email.trim().to_lowercase();
        // Every account starts as patient; provider and partner roles are
        // granted when an admin approves the matching application.
        let stored_role = Role::Patient;
        let requested_role = (request.role != Role::Patient).then_some(request.role);

        let password_hash = hash_password(&request.password)?;

        let mut tx = self.db.begin().await?;

        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE lower(email) = $1")
                .bind(&email)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let user_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, role, name, email_verified) \
             VALUES ($1, $2, $3, $4, $5, false)",
        )
        .bind(user_id)
        .bind(&email)
        .bind(&password_hash)
        .bind(stored_role)
        .bind(request.name.trim())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "User {} signed up as {} (requested: {:?})",
            user_id, stored_role, requested_role
        );
        Ok(SignupResponse {
            user_id,
            role: stored_role,
            requested_role,
        })
    }

    /// Password login. A wrong email and a wrong password are
    /// indistinguishable to the caller.
    pub async fn login(&self, request: LoginRequest) -> Result<(String, UserAccount), AuthError> {
        let email = request.email.trim().to_lowercase();

        let account: Option<UserAccount> =
            sqlx::query_as("SELECT * FROM users WHERE lower(email) = $1")
                .bind(&email)
                .fetch_optional(self.db.pool())
                .await?;

        let account = match account {
            Some(account) => account,
            None => {
                warn!("Login attempt for unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !verify_password(&request.password, &account.password_hash) {
            warn!("Failed login for user {}", account.id);
            return Err(AuthError::InvalidCredentials);
        }

        let auth_user = AuthUser {
            id: account.id,
            email: Some(account.email.clone()),
            role: account.role,
        };
        let token = issue_token(&auth_user, &self.jwt_secret).map_err(AuthError::Internal)?;

        info!("User {} logged in", account.id);
        Ok((token, account))
    }
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn validate_signup(request: &SignupRequest) -> Result<(), AuthError> {
    if !email_regex().is_match(request.email.trim()) {
        return Err(AuthError::ValidationError(
            "Invalid email address".to_string(),
        ));
    }
    if request.password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if request.name.trim().is_empty() {
        return Err(AuthError::ValidationError("Name is required".to_string()));
    }
    if request.role == Role::Admin {
        return Err(AuthError::ValidationError(
            "Admin accounts cannot self-signup".to_string(),
        ));
    }
    Ok(())
}
