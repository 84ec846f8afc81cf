//! Lifecycle tests against a real Postgres with the migrations applied.
//! Ignored by default:
//!
//!   DATABASE_URL=postgres://... cargo test -p prescription-cell -- --ignored

use uuid::Uuid;

use prescription_cell::models::{
    CreatePrescriptionRequest, Medication, PrescriptionError, PrescriptionStatus,
};
use prescription_cell::services::lifecycle::PrescriptionLifecycleService;
use shared_database::DatabasePool;
use shared_models::roles::Role;

async fn live_pool() -> DatabasePool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for live tests");
    DatabasePool::connect(&url).await.expect("connect to test database")
}

async fn insert_user(db: &DatabasePool, role: Role) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, role, name) \
         VALUES ($1, $2, 'x', $3, 'Test User')",
    )
    .bind(id)
    .bind(format!("{}@example.com", id))
    .bind(role)
    .execute(db.pool())
    .await
    .expect("insert test user");
    id
}

async fn insert_consultation(db: &DatabasePool, patient: Uuid, gp: Uuid, status: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO consultations \
           (id, patient_id, provider_id, provider_type, chief_complaint, urgency, status) \
         VALUES ($1, $2, $3, 'gp', 'Hypertension follow-up', 'routine', $4)",
    )
    .bind(id)
    .bind(patient)
    .bind(gp)
    .bind(status)
    .execute(db.pool())
    .await
    .expect("insert test consultation");
    id
}

fn medications() -> Vec<Medication> {
    vec![Medication {
        name: "Lisinopril".to_string(),
        dosage: "10mg".to_string(),
        frequency: "daily".to_string(),
        duration: "30 days".to_string(),
        instructions: Some("Take in the morning".to_string()),
    }]
}

#[tokio::test]
#[ignore]
async fn issuing_closes_in_progress_consultation() {
    let db = live_pool().await;
    let patient = insert_user(&db, Role::Patient).await;
    let gp = insert_user(&db, Role::Gp).await;
    let consultation = insert_consultation(&db, patient, gp, "in_progress").await;
    let service = PrescriptionLifecycleService::new(db.clone());

    let prescription = service
        .create_prescription(CreatePrescriptionRequest {
            consultation_id: consultation,
            patient_id: patient,
            provider_id: gp,
            medications: medications(),
        })
        .await
        .unwrap();

    assert_eq!(prescription.status, PrescriptionStatus::Pending);
    assert!(prescription.pharmacy_id.is_none());
    assert_eq!(prescription.medications.0, medications());

    let status: String = sqlx::query_scalar("SELECT status FROM consultations WHERE id = $1")
        .bind(consultation)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(status, "completed");
}

#[tokio::test]
#[ignore]
async fn qr_claim_race_has_one_winner() {
    let db = live_pool().await;
    let patient = insert_user(&db, Role::Patient).await;
    let gp = insert_user(&db, Role::Gp).await;
    let pharmacy_a = insert_user(&db, Role::Pharmacy).await;
    let pharmacy_b = insert_user(&db, Role::Pharmacy).await;
    let consultation = insert_consultation(&db, patient, gp, "accepted").await;
    let service = PrescriptionLifecycleService::new(db.clone());

    let prescription = service
        .create_prescription(CreatePrescriptionRequest {
            consultation_id: consultation,
            patient_id: patient,
            provider_id: gp,
            medications: medications(),
        })
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        service.claim_by_qr(&prescription.qr_token, pharmacy_a),
        service.claim_by_qr(&prescription.qr_token, pharmacy_b),
    );
    let outcomes = [a, b];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(PrescriptionError::AlreadyClaimed))));

    // Exactly one claim notification reaches the patient.
    let notified: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications \
         WHERE user_id = $1 AND notification_type = 'prescription_assigned'",
    )
    .bind(patient)
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(notified, 1);
}

#[tokio::test]
#[ignore]
async fn same_pharmacy_reclaim_is_idempotent() {
    let db = live_pool().await;
    let patient = insert_user(&db, Role::Patient).await;
    let gp = insert_user(&db, Role::Gp).await;
    let pharmacy = insert_user(&db, Role::Pharmacy).await;
    let consultation = insert_consultation(&db, patient, gp, "accepted").await;
    let service = PrescriptionLifecycleService::new(db.clone());

    let prescription = service
        .create_prescription(CreatePrescriptionRequest {
            consultation_id: consultation,
            patient_id: patient,
            provider_id: gp,
            medications: medications(),
        })
        .await
        .unwrap();

    let first = service.claim_by_qr(&prescription.qr_token, pharmacy).await.unwrap();
    let second = service.claim_by_qr(&prescription.qr_token, pharmacy).await.unwrap();
    assert_eq!(first.pharmacy_id, Some(pharmacy));
    assert_eq!(second.pharmacy_id, Some(pharmacy));

    // The re-scan does not produce a second notification.
    let notified: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications \
         WHERE user_id = $1 AND notification_type = 'prescription_assigned'",
    )
    .bind(patient)
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(notified, 1);

    let err = service
        .claim_by_qr("not-a-real-token", pharmacy)
        .await
        .unwrap_err();
    assert!(matches!(err, PrescriptionError::InvalidQrToken));
}

#[tokio::test]
#[ignore]
async fn failed_notification_insert_rolls_back_the_claim() {
    let db = live_pool().await;
    let patient = insert_user(&db, Role::Patient).await;
    let gp = insert_user(&db, Role::Gp).await;
    let pharmacy = insert_user(&db, Role::Pharmacy).await;
    let consultation = insert_consultation(&db, patient, gp, "accepted").await;
    let service = PrescriptionLifecycleService::new(db.clone());

    let prescription = service
        .create_prescription(CreatePrescriptionRequest {
            consultation_id: consultation,
            patient_id: patient,
            provider_id: gp,
            medications: medications(),
        })
        .await
        .unwrap();

    // Make the patient's notification insert fail mid-transaction. NOT VALID
    // leaves the issuance notification already on file alone and only bites
    // on new inserts.
    let constraint = format!("notif_block_{}", patient.simple());
    sqlx::query(&format!(
        "ALTER TABLE notifications ADD CONSTRAINT {} CHECK (user_id <> '{}') NOT VALID",
        constraint, patient
    ))
    .execute(db.pool())
    .await
    .unwrap();

    let err = service
        .claim_by_qr(&prescription.qr_token, pharmacy)
        .await
        .unwrap_err();
    assert!(matches!(err, PrescriptionError::DatabaseError(_)));

    // The assignment rolled back with the notification.
    let pharmacy_id: Option<Uuid> =
        sqlx::query_scalar("SELECT pharmacy_id FROM prescriptions WHERE id = $1")
            .bind(prescription.id)
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert!(pharmacy_id.is_none());

    sqlx::query(&format!(
        "ALTER TABLE notifications DROP CONSTRAINT {}",
        constraint
    ))
    .execute(db.pool())
    .await
    .unwrap();

    let claimed = service.claim_by_qr(&prescription.qr_token, pharmacy).await.unwrap();
    assert_eq!(claimed.pharmacy_id, Some(pharmacy));
}

#[tokio::test]
#[ignore]
async fn fulfilment_is_pharmacy_scoped_and_forward_only() {
    let db = live_pool().await;
    let patient = insert_user(&db, Role::Patient).await;
    let gp = insert_user(&db, Role::Gp).await;
    let pharmacy = insert_user(&db, Role::Pharmacy).await;
    let other_pharmacy = insert_user(&db, Role::Pharmacy).await;
    let consultation = insert_consultation(&db, patient, gp, "accepted").await;
    let service = PrescriptionLifecycleService::new(db.clone());

    let prescription = service
        .create_prescription(CreatePrescriptionRequest {
            consultation_id: consultation,
            patient_id: patient,
            provider_id: gp,
            medications: medications(),
        })
        .await
        .unwrap();
    service.claim_by_qr(&prescription.qr_token, pharmacy).await.unwrap();

    // An unassigned pharmacy is rejected outright.
    let err = service
        .update_fulfillment(prescription.id, other_pharmacy, PrescriptionStatus::Preparing)
        .await
        .unwrap_err();
    assert!(matches!(err, PrescriptionError::NotAssignedPharmacy));

    // Skipping ahead is rejected.
    let err = service
        .update_fulfillment(prescription.id, pharmacy, PrescriptionStatus::Delivered)
        .await
        .unwrap_err();
    assert!(matches!(err, PrescriptionError::InvalidStatusTransition { .. }));

    for status in [
        PrescriptionStatus::Preparing,
        PrescriptionStatus::Ready,
        PrescriptionStatus::Delivered,
    ] {
        let updated = service
            .update_fulfillment(prescription.id, pharmacy, status)
            .await
            .unwrap();
        assert_eq!(updated.status, status);
    }

    // Delivered is terminal.
    let err = service
        .update_fulfillment(prescription.id, pharmacy, PrescriptionStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, PrescriptionError::InvalidStatusTransition { .. }));
}
