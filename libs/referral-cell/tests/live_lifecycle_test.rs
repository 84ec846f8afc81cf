//! Lifecycle tests against a real Postgres with the migrations applied.
//! Ignored by default:
//!
//!   DATABASE_URL=postgres://... cargo test -p referral-cell -- --ignored

use uuid::Uuid;

use consultation_cell::models::ConsultationStatus;
use referral_cell::models::{
    CreateReferralRequest, LifecycleAction, ReferralError, ReferralStatus,
};
use referral_cell::services::lifecycle::ReferralLifecycleService;
use shared_database::DatabasePool;
use shared_models::roles::Role;

async fn live_pool() -> DatabasePool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for live tests");
    DatabasePool::connect(&url).await.expect("connect to test database")
}

async fn insert_user(db: &DatabasePool, role: Role, specialization: Option<&str>) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, role, name, specialization) \
         VALUES ($1, $2, 'x', $3, 'Test User', $4)",
    )
    .bind(id)
    .bind(format!("{}@example.com", id))
    .bind(role)
    .bind(specialization)
    .execute(db.pool())
    .await
    .expect("insert test user");
    id
}

async fn setup(db: &DatabasePool) -> (Uuid, Uuid, Uuid, Uuid) {
    let patient = insert_user(db, Role::Patient, None).await;
    let gp = insert_user(db, Role::Gp, None).await;
    let specialist_a = insert_user(db, Role::Specialist, Some("Cardiology")).await;
    let specialist_b = insert_user(db, Role::Specialist, Some("Interventional Cardiology")).await;
    (patient, gp, specialist_a, specialist_b)
}

fn request(patient: Uuid, gp: Uuid) -> CreateReferralRequest {
    CreateReferralRequest {
        patient_id: patient,
        referring_provider_id: gp,
        specialization: "cardio".to_string(),
        reason: "Suspected arrhythmia".to_string(),
    }
}

#[tokio::test]
#[ignore]
async fn substring_match_finds_specialists() {
    let db = live_pool().await;
    let (patient, gp, specialist_a, specialist_b) = setup(&db).await;
    let service = ReferralLifecycleService::new(db.clone(), 20);

    let response = service.create_referral(request(patient, gp)).await.unwrap();
    assert_eq!(response.referral.status, ReferralStatus::Pending);

    let ids: Vec<Uuid> = response.available_specialists.iter().map(|s| s.id).collect();
    assert!(ids.contains(&specialist_a));
    assert!(ids.contains(&specialist_b));
}

#[tokio::test]
#[ignore]
async fn decline_leaves_referral_open_for_others() {
    let db = live_pool().await;
    let (patient, gp, specialist_a, specialist_b) = setup(&db).await;
    let service = ReferralLifecycleService::new(db.clone(), 20);

    let response = service.create_referral(request(patient, gp)).await.unwrap();
    let referral_id = response.referral.id;

    // Specialist A declines: the referral stays pending.
    let (declined, spawned) = service
        .act_on_referral(referral_id, specialist_a, LifecycleAction::Decline, None)
        .await
        .unwrap();
    assert_eq!(declined.status, ReferralStatus::Pending);
    assert!(spawned.is_none());

    // Specialist B may still accept, which locks the referral and spawns a
    // pre-accepted consultation.
    let (accepted, consultation) = service
        .act_on_referral(referral_id, specialist_b, LifecycleAction::Accept, None)
        .await
        .unwrap();
    assert_eq!(accepted.status, ReferralStatus::Accepted);
    assert_eq!(accepted.specialist_id, Some(specialist_b));

    let consultation = consultation.expect("accept must spawn a consultation");
    assert_eq!(consultation.status, ConsultationStatus::Accepted);
    assert_eq!(consultation.provider_id, Some(specialist_b));
    assert_eq!(accepted.consultation_id, Some(consultation.id));

    // Once accepted, everyone else is locked out, including decliners.
    let err = service
        .act_on_referral(referral_id, specialist_a, LifecycleAction::Accept, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReferralError::AlreadyResolved(ReferralStatus::Accepted)));
}

#[tokio::test]
#[ignore]
async fn accept_produces_exactly_one_consultation() {
    let db = live_pool().await;
    let (patient, gp, specialist_a, _) = setup(&db).await;
    let service = ReferralLifecycleService::new(db.clone(), 20);

    let response = service.create_referral(request(patient, gp)).await.unwrap();
    service
        .act_on_referral(response.referral.id, specialist_a, LifecycleAction::Accept, None)
        .await
        .unwrap();

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM consultations WHERE referral_id = $1")
            .bind(response.referral.id)
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(count, 1);

    // Both the patient and the referring provider hear about it.
    for user in [patient, gp] {
        let notified: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications \
             WHERE user_id = $1 AND notification_type = 'referral_accepted'",
        )
        .bind(user)
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(notified, 1);
    }
}
