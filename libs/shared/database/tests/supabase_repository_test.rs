use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_database::*;
use shared_models::{AppError, AppointmentStatus, Message, MessageBatch, MessageBatchStatus};
use shared_utils::test_utils::{AppointmentFactory, ClinicFactory, TestConfig};

async fn repository_for(mock_server: &MockServer) -> SupabaseRepository {
    let mut config = TestConfig::default();
    config.supabase_url = mock_server.uri();
    SupabaseRepository::new(&config.to_app_config())
}

#[tokio::test]
async fn test_upsert_clinic_inserts_when_missing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/clinics"))
        .and(query_param("bso_code", "eq.KMK"))
        .and(query_param("code", "eq.BU003"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/clinics"))
        .and(header("apikey", "test-service-key"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({ "bso_code": "KMK", "code": "BU003" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{}])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let repository = repository_for(&mock_server).await;
    let (clinic, created) = repository
        .upsert_clinic(ClinicFactory::details("KMK", "BU003"), Utc::now())
        .await
        .unwrap();

    assert!(created);
    assert_eq!(clinic.code, "BU003");
}

#[tokio::test]
async fn test_upsert_clinic_patches_changed_fields() {
    let mock_server = MockServer::start().await;
    let now = Utc::now();
    let existing = shared_models::Clinic::new(ClinicFactory::details("KMK", "BU003"), now);

    Mock::given(method("GET"))
        .and(path("/rest/v1/clinics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([existing])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/clinics"))
        .and(query_param("id", format!("eq.{}", existing.id)))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({ "postcode": "MK6 9ZZ" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([existing])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut details = ClinicFactory::details("KMK", "BU003");
    details.postcode = "MK6 9ZZ".to_string();

    let repository = repository_for(&mock_server).await;
    let (clinic, created) = repository.upsert_clinic(details, now).await.unwrap();

    assert!(!created);
    assert_eq!(clinic.id, existing.id);
}

#[tokio::test]
async fn test_due_appointments_use_anti_join_and_cutoff() {
    let mock_server = MockServer::start().await;
    let cutoff = Utc.with_ymd_and_hms(2025, 4, 15, 22, 59, 59).unwrap();
    let appointment = AppointmentFactory::build(
        Uuid::new_v4(),
        "BU011-67278-RA1-DN-Y1111-1",
        cutoff,
        AppointmentStatus::Booked,
    );
    let mut row = serde_json::to_value(&appointment).unwrap();
    row["messages"] = json!([]);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("messages", "is.null"))
        .and(query_param("status", "eq.B"))
        .and(query_param("starts_at", "lte.2025-04-15T22:59:59.000000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let repository = repository_for(&mock_server).await;
    let due = repository.appointments_due_for_messaging(cutoff).await.unwrap();

    assert_eq!(due, vec![appointment]);
}

#[tokio::test]
async fn test_batch_and_messages_are_created_in_one_call() {
    let mock_server = MockServer::start().await;
    let batch = MessageBatch::new(Some(Uuid::new_v4()), Utc::now());
    let message = Message::for_appointment(Uuid::new_v4(), batch.id, Utc::now());

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/create_message_batch"))
        .and(body_partial_json(json!({
            "batch": { "id": batch.id.to_string(), "status": "scheduled" },
            "messages": [{ "id": message.id.to_string(), "status": "pending_enrichment" }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let repository = repository_for(&mock_server).await;
    repository.create_batch_with_messages(&batch, &[message]).await.unwrap();
}

#[tokio::test]
async fn test_find_batch_filters_on_status() {
    let mock_server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/message_batches"))
        .and(query_param("id", format!("eq.{}", id)))
        .and(query_param("status", "eq.failed_recoverable"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let repository = repository_for(&mock_server).await;
    let batch = repository
        .find_batch(id, Some(MessageBatchStatus::FailedRecoverable))
        .await
        .unwrap();

    assert!(batch.is_none());
}

#[tokio::test]
async fn test_unique_violation_maps_to_conflict() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/message_statuses"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint"
        })))
        .mount(&mock_server)
        .await;

    let repository = repository_for(&mock_server).await;
    let result = repository
        .insert_message_status(&shared_models::MessageStatus {
            id: Uuid::new_v4(),
            message_id: Uuid::new_v4(),
            status: "delivered".to_string(),
            description: "Delivered".to_string(),
            idempotency_key: "key-1".to_string(),
            status_updated_at: Utc::now(),
            created_at: Utc::now(),
        })
        .await;

    assert_matches!(result, Err(AppError::Conflict(_)));
}

#[tokio::test]
async fn test_idempotency_key_lookup_is_url_encoded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/channel_statuses"))
        .and(query_param("idempotency_key", "eq.abc+def/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": Uuid::new_v4() }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let repository = repository_for(&mock_server).await;
    assert!(repository.channel_status_exists("abc+def/1").await.unwrap());
}

#[tokio::test]
async fn test_update_of_missing_row_is_not_found() {
    let mock_server = MockServer::start().await;
    let batch = MessageBatch::new(None, Utc::now());

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/message_batches"))
        .and(query_param("id", format!("eq.{}", batch.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let repository = repository_for(&mock_server).await;
    let result = repository.update_batch(&batch).await;

    assert_matches!(result, Err(AppError::NotFound(_)));
}

#[tokio::test]
async fn test_appointments_are_fetched_by_id_list() {
    let mock_server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    let first = AppointmentFactory::build(clinic_id, "BU003-1-A", Utc::now(), AppointmentStatus::Booked);
    let second = AppointmentFactory::build(clinic_id, "BU003-2-A", Utc::now(), AppointmentStatus::Booked);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("in.({},{})", first.id, second.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([first, second])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let repository = repository_for(&mock_server).await;
    let appointments = repository.get_appointments(&[first.id, second.id]).await.unwrap();
    assert_eq!(appointments, vec![first, second]);

    // No request for an empty list.
    assert!(repository.get_clinics(&[]).await.unwrap().is_empty());
}
