//! Account flow tests against a real Postgres with the migrations applied.
//! Ignored by default:
//!
//!   DATABASE_URL=postgres://... cargo test -p auth-cell -- --ignored

use uuid::Uuid;

use auth_cell::models::{AuthError, LoginRequest, SignupRequest};
use auth_cell::services::account::AccountService;
use shared_database::DatabasePool;
use shared_models::roles::Role;
use shared_utils::jwt::validate_token;

const JWT_SECRET: &str = "live-test-secret-key-that-is-long-enough";

async fn live_service() -> AccountService {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for live tests");
    let db = DatabasePool::connect(&url).await.expect("connect to test database");
    AccountService::new(db, JWT_SECRET.to_string())
}

fn signup(email: &str, role: Role) -> SignupRequest {
    SignupRequest {
        email: email.to_string(),
        password: "a-strong-password".to_string(),
        name: "Test User".to_string(),
        role,
    }
}

#[tokio::test]
#[ignore]
async fn signup_then_login_round_trips() {
    let service = live_service().await;
    let email = format!("{}@example.com", Uuid::new_v4());

    let created = service.signup(signup(&email, Role::Patient)).await.unwrap();
    assert_eq!(created.role, Role::Patient);
    assert!(created.requested_role.is_none());

    let (token, account) = service
        .login(LoginRequest {
            email: email.clone(),
            password: "a-strong-password".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(account.id, created.user_id);

    let validated = validate_token(&token, JWT_SECRET).unwrap();
    assert_eq!(validated.id, created.user_id);
    assert_eq!(validated.role, Role::Patient);
}

#[tokio::test]
#[ignore]
async fn duplicate_email_conflicts_case_insensitively() {
    let service = live_service().await;
    let email = format!("{}@Example.com", Uuid::new_v4());

    service.signup(signup(&email, Role::Patient)).await.unwrap();
    let err = service
        .signup(signup(&email.to_lowercase(), Role::Patient))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::EmailTaken));
}

#[tokio::test]
#[ignore]
async fn provider_signup_starts_as_patient() {
    let service = live_service().await;
    let email = format!("{}@example.com", Uuid::new_v4());

    let created = service.signup(signup(&email, Role::Specialist)).await.unwrap();
    assert_eq!(created.role, Role::Patient);
    assert_eq!(created.requested_role, Some(Role::Specialist));

    let (_, account) = service
        .login(LoginRequest {
            email,
            password: "a-strong-password".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(account.role, Role::Patient);
}

#[tokio::test]
#[ignore]
async fn wrong_password_is_rejected() {
    let service = live_service().await;
    let email = format!("{}@example.com", Uuid::new_v4());
    service.signup(signup(&email, Role::Patient)).await.unwrap();

    let err = service
        .login(LoginRequest {
            email,
            password: "not-the-password".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}
