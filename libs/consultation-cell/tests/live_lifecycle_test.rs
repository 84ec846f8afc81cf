//! Lifecycle tests against a real Postgres with the migrations applied.
//! These are ignored by default; run them with:
//!
//!   DATABASE_URL=postgres://... cargo test -p consultation-cell -- --ignored

use uuid::Uuid;

use consultation_cell::models::{
    ConsultationError, ConsultationStatus, CreateConsultationRequest, LifecycleAction,
};
use consultation_cell::services::lifecycle::ConsultationLifecycleService;
use shared_database::DatabasePool;
use shared_models::roles::{Role, Urgency};

async fn live_pool() -> DatabasePool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for live tests");
    DatabasePool::connect(&url).await.expect("connect to test database")
}

async fn insert_user(db: &DatabasePool, role: Role) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, role, name) VALUES ($1, $2, 'x', $3, 'Test User')",
    )
    .bind(id)
    .bind(format!("{}@example.com", id))
    .bind(role)
    .execute(db.pool())
    .await
    .expect("insert test user");
    id
}

fn request_for(patient_id: Uuid) -> CreateConsultationRequest {
    CreateConsultationRequest {
        patient_id,
        provider_type: Role::Gp,
        chief_complaint: "Persistent cough".to_string(),
        urgency: Urgency::Routine,
        consultation_fee: Some(35.0),
    }
}

async fn notification_count(db: &DatabasePool, user_id: Uuid, notification_type: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND notification_type = $2",
    )
    .bind(user_id)
    .bind(notification_type)
    .fetch_one(db.pool())
    .await
    .expect("count notifications")
}

#[tokio::test]
#[ignore]
async fn create_fans_out_to_gps_and_unknown_patient_fails() {
    let db = live_pool().await;
    let patient = insert_user(&db, Role::Patient).await;
    let gp = insert_user(&db, Role::Gp).await;
    let service = ConsultationLifecycleService::new(db.clone(), 20);

    let consultation = service.create_consultation(request_for(patient)).await.unwrap();
    assert_eq!(consultation.status, ConsultationStatus::Pending);
    assert!(consultation.provider_id.is_none());
    assert!(notification_count(&db, gp, "consultation_request").await >= 1);

    let err = service.create_consultation(request_for(Uuid::new_v4())).await.unwrap_err();
    assert!(matches!(err, ConsultationError::PatientNotFound));
}

#[tokio::test]
#[ignore]
async fn double_accept_yields_one_winner_and_one_conflict() {
    let db = live_pool().await;
    let patient = insert_user(&db, Role::Patient).await;
    let gp_a = insert_user(&db, Role::Gp).await;
    let gp_b = insert_user(&db, Role::Gp).await;
    let service = ConsultationLifecycleService::new(db.clone(), 20);

    let consultation = service.create_consultation(request_for(patient)).await.unwrap();

    let service_a = ConsultationLifecycleService::new(db.clone(), 20);
    let service_b = ConsultationLifecycleService::new(db.clone(), 20);
    let (result_a, result_b) = tokio::join!(
        service_a.act_on_consultation(consultation.id, gp_a, LifecycleAction::Accept),
        service_b.act_on_consultation(consultation.id, gp_b, LifecycleAction::Accept),
    );

    let successes = [&result_a, &result_b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one accept must win");

    let loser = if result_a.is_ok() { result_b } else { result_a };
    assert!(matches!(loser, Err(ConsultationError::AlreadyResolved(_))));

    // The patient sees exactly one acceptance.
    assert_eq!(notification_count(&db, patient, "consultation_accepted").await, 1);

    let resolved = service.get_consultation(consultation.id).await.unwrap();
    assert_eq!(resolved.status, ConsultationStatus::Accepted);
    assert!(resolved.provider_id == Some(gp_a) || resolved.provider_id == Some(gp_b));
}

#[tokio::test]
#[ignore]
async fn start_is_scoped_to_the_accepting_provider() {
    let db = live_pool().await;
    let patient = insert_user(&db, Role::Patient).await;
    let gp = insert_user(&db, Role::Gp).await;
    let other_gp = insert_user(&db, Role::Gp).await;
    let service = ConsultationLifecycleService::new(db.clone(), 20);

    let consultation = service.create_consultation(request_for(patient)).await.unwrap();

    // Nothing to start while the request is still pending.
    let err = service.start_consultation(consultation.id, gp).await.unwrap_err();
    assert!(matches!(err, ConsultationError::Unauthorized));

    service
        .act_on_consultation(consultation.id, gp, LifecycleAction::Accept)
        .await
        .unwrap();

    let err = service
        .start_consultation(consultation.id, other_gp)
        .await
        .unwrap_err();
    assert!(matches!(err, ConsultationError::Unauthorized));

    let started = service.start_consultation(consultation.id, gp).await.unwrap();
    assert_eq!(started.status, ConsultationStatus::InProgress);
    assert_eq!(notification_count(&db, patient, "consultation_started").await, 1);

    // Already in progress; a second start is rejected.
    let err = service.start_consultation(consultation.id, gp).await.unwrap_err();
    assert!(matches!(
        err,
        ConsultationError::InvalidStatusTransition(ConsultationStatus::InProgress)
    ));
}

#[tokio::test]
#[ignore]
async fn failed_notification_insert_rolls_back_the_acceptance() {
    let db = live_pool().await;
    let patient = insert_user(&db, Role::Patient).await;
    let gp = insert_user(&db, Role::Gp).await;
    let service = ConsultationLifecycleService::new(db.clone(), 20);

    let consultation = service.create_consultation(request_for(patient)).await.unwrap();

    // Make the patient's notification insert fail mid-transaction.
    let constraint = format!("notif_block_{}", patient.simple());
    sqlx::query(&format!(
        "ALTER TABLE notifications ADD CONSTRAINT {} CHECK (user_id <> '{}')",
        constraint, patient
    ))
    .execute(db.pool())
    .await
    .unwrap();

    let err = service
        .act_on_consultation(consultation.id, gp, LifecycleAction::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, ConsultationError::DatabaseError(_)));

    // The status flip rolled back with the notification.
    let reread = service.get_consultation(consultation.id).await.unwrap();
    assert_eq!(reread.status, ConsultationStatus::Pending);
    assert!(reread.provider_id.is_none());
    assert_eq!(notification_count(&db, patient, "consultation_accepted").await, 0);

    sqlx::query(&format!(
        "ALTER TABLE notifications DROP CONSTRAINT {}",
        constraint
    ))
    .execute(db.pool())
    .await
    .unwrap();

    // With the failure removed the same call goes through.
    let accepted = service
        .act_on_consultation(consultation.id, gp, LifecycleAction::Accept)
        .await
        .unwrap();
    assert_eq!(accepted.status, ConsultationStatus::Accepted);
    assert_eq!(notification_count(&db, patient, "consultation_accepted").await, 1);
}

#[tokio::test]
#[ignore]
async fn decline_is_terminal_for_consultations() {
    let db = live_pool().await;
    let patient = insert_user(&db, Role::Patient).await;
    let gp_a = insert_user(&db, Role::Gp).await;
    let gp_b = insert_user(&db, Role::Gp).await;
    let service = ConsultationLifecycleService::new(db.clone(), 20);

    let consultation = service.create_consultation(request_for(patient)).await.unwrap();

    service
        .act_on_consultation(consultation.id, gp_a, LifecycleAction::Decline)
        .await
        .unwrap();

    // Unlike referrals, a declined consultation is closed for everyone.
    let err = service
        .act_on_consultation(consultation.id, gp_b, LifecycleAction::Accept)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConsultationError::AlreadyResolved(ConsultationStatus::Declined)
    ));
}

#[tokio::test]
#[ignore]
async fn cancel_is_blocked_after_completion() {
    let db = live_pool().await;
    let patient = insert_user(&db, Role::Patient).await;
    let gp = insert_user(&db, Role::Gp).await;
    let service = ConsultationLifecycleService::new(db.clone(), 20);

    let consultation = service.create_consultation(request_for(patient)).await.unwrap();
    service
        .act_on_consultation(consultation.id, gp, LifecycleAction::Accept)
        .await
        .unwrap();

    sqlx::query("UPDATE consultations SET status = 'completed' WHERE id = $1")
        .bind(consultation.id)
        .execute(db.pool())
        .await
        .unwrap();

    let err = service.cancel_consultation(consultation.id).await.unwrap_err();
    assert!(matches!(err, ConsultationError::InvalidStatusTransition(_)));
}
