use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::*;
use shared_utils::test_utils::TestConfig;

async fn storage_for(mock_server: &MockServer) -> SupabaseBlobStorage {
    let mut config = TestConfig::default();
    config.supabase_url = mock_server.uri();
    SupabaseBlobStorage::new(&config.to_app_config())
}

#[tokio::test]
async fn test_lists_files_in_the_date_folder() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/storage/v1/object/list/notifications-extracts"))
        .and(header("authorization", "Bearer test-service-key"))
        .and(body_partial_json(json!({ "prefix": "2025-07-01" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "ABC_20250701091321_APPT_107.dat", "id": "b1c5b6f0-4a0e-4f57-9a7d-3b3f0b8f1a11" },
            { "name": "ABC_20250701091221_APPT_106.dat", "id": "0f0a7c3e-9a55-4b86-8c11-2d1e3f4a5b6c" },
            { "name": "archive", "id": null }
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let storage = storage_for(&mock_server).await;
    let names = storage.list_blobs("2025-07-01").await.unwrap();

    assert_eq!(
        names,
        vec![
            "2025-07-01/ABC_20250701091221_APPT_106.dat",
            "2025-07-01/ABC_20250701091321_APPT_107.dat",
        ]
    );
}

#[tokio::test]
async fn test_downloads_blob_text() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/object/notifications-extracts/2025-07-01/ABC_20250701091221_APPT_106.dat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("PREAMBLE\nHEADER\nTRAILER\n"))
        .mount(&mock_server)
        .await;

    let storage = storage_for(&mock_server).await;
    let content = storage
        .download("2025-07-01/ABC_20250701091221_APPT_106.dat")
        .await
        .unwrap();

    assert_eq!(content, "PREAMBLE\nHEADER\nTRAILER\n");
}

#[tokio::test]
async fn test_storage_failures_are_reported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/storage/v1/object/list/notifications-extracts"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let storage = storage_for(&mock_server).await;

    assert_matches!(storage.list_blobs("2025-07-01").await, Err(AppointmentError::StorageError(_)));
}
