//! Review flow tests against a real Postgres with the migrations applied.
//! Ignored by default:
//!
//!   DATABASE_URL=postgres://... cargo test -p application-cell -- --ignored

use uuid::Uuid;

use application_cell::models::{
    ApplicationError, ApplicationStatus, ProviderApplicationRequest, ReviewAction, ReviewRequest,
};
use application_cell::services::review::ApplicationService;
use shared_database::DatabasePool;
use shared_models::roles::Role;

async fn live_pool() -> DatabasePool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for live tests");
    DatabasePool::connect(&url).await.expect("connect to test database")
}

async fn insert_patient(db: &DatabasePool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, role, name) \
         VALUES ($1, $2, 'x', 'patient', 'Test User')",
    )
    .bind(id)
    .bind(format!("{}@example.com", id))
    .execute(db.pool())
    .await
    .expect("insert test user");
    id
}

fn gp_application() -> ProviderApplicationRequest {
    ProviderApplicationRequest {
        requested_role: Role::Gp,
        license_number: "LIC-12345".to_string(),
        specialization: None,
    }
}

#[tokio::test]
#[ignore]
async fn second_pending_application_conflicts() {
    let db = live_pool().await;
    let user = insert_patient(&db).await;
    let service = ApplicationService::new(db.clone());

    service.submit_provider(user, gp_application()).await.unwrap();
    let err = service.submit_provider(user, gp_application()).await.unwrap_err();
    assert!(matches!(err, ApplicationError::AlreadyPending));
}

#[tokio::test]
#[ignore]
async fn approval_flips_role_and_notifies() {
    let db = live_pool().await;
    let user = insert_patient(&db).await;
    let service = ApplicationService::new(db.clone());

    let application = service.submit_provider(user, gp_application()).await.unwrap();
    assert_eq!(application.status, ApplicationStatus::Pending);

    let reviewed = service
        .review(
            application.id,
            ReviewRequest {
                action: ReviewAction::Approve,
                reason: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(reviewed.status(), ApplicationStatus::Approved);

    let role: Role = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(user)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(role, Role::Gp);

    let notified: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications \
         WHERE user_id = $1 AND notification_type = 'application_approved'",
    )
    .bind(user)
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(notified, 1);

    // pending -> approved is terminal.
    let err = service
        .review(
            application.id,
            ReviewRequest {
                action: ReviewAction::Reject,
                reason: Some("too late".to_string()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::AlreadyReviewed(ApplicationStatus::Approved)
    ));
}

#[tokio::test]
#[ignore]
async fn rejection_requires_and_records_reason() {
    let db = live_pool().await;
    let user = insert_patient(&db).await;
    let service = ApplicationService::new(db.clone());

    let application = service.submit_provider(user, gp_application()).await.unwrap();

    let err = service
        .review(
            application.id,
            ReviewRequest {
                action: ReviewAction::Reject,
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::ValidationError(_)));

    let reviewed = service
        .review(
            application.id,
            ReviewRequest {
                action: ReviewAction::Reject,
                reason: Some("License could not be verified".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(reviewed.status(), ApplicationStatus::Rejected);

    // The applicant keeps their current role.
    let role: Role = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(user)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(role, Role::Patient);
}
