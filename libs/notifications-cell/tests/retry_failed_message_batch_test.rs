mod common;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{accept_batch, Harness};
use message_queue_cell::MessageQueue;
use notifications_cell::{
    BatchBuilder, NotificationsError, RetryCoordinator, RetryOutcome, RetryRequest, SendMessageBatchJob,
    MESSAGE_BATCHES_PATH,
};
use shared_models::{MessageBatch, MessageBatchStatus, MessageDeliveryStatus};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap()
}

fn coordinator(harness: &Harness) -> RetryCoordinator {
    RetryCoordinator::new(
        harness.retry_queue.clone(),
        harness.store.clone(),
        harness.service(),
        harness.config.batch_retry_limit,
    )
}

/// Sends a batch against a failing API so it lands on the retry queue.
async fn failed_batch(harness: &Harness) -> MessageBatch {
    harness
        .booked_appointment("BU003-67278-RA1-DN-T1315-1", Utc.with_ymd_and_hms(2025, 7, 10, 9, 0, 0).unwrap())
        .await;
    let builder = BatchBuilder::new(harness.store.clone(), harness.store.clone(), harness.config.timezone);
    SendMessageBatchJob::new(builder, harness.service())
        .run(Uuid::new_v4(), now())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn empty_queue_does_nothing() {
    let harness = Harness::new("http://localhost:8089");

    let outcome = coordinator(&harness).run(now()).await.unwrap();

    assert_eq!(outcome, RetryOutcome::QueueEmpty);
}

#[tokio::test]
async fn successful_retry_marks_batch_as_sent() {
    let mock_server = MockServer::start().await;
    let harness = Harness::new(&mock_server.uri());

    let failing = Mock::given(method("POST"))
        .and(path(MESSAGE_BATCHES_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount_as_scoped(&mock_server)
        .await;
    let batch = failed_batch(&harness).await;
    assert_eq!(batch.status, MessageBatchStatus::FailedRecoverable);
    drop(failing);

    Mock::given(method("POST"))
        .and(path(MESSAGE_BATCHES_PATH))
        .respond_with(accept_batch("notify-batch-2"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let outcome = coordinator(&harness).run(now()).await.unwrap();

    assert_eq!(
        outcome,
        RetryOutcome::Resent {
            batch_status: MessageBatchStatus::Sent,
            retry_count: 0
        }
    );
    let stored = harness.store.batches().await;
    assert_eq!(stored[0].status, MessageBatchStatus::Sent);
    assert_eq!(stored[0].notify_id, "notify-batch-2");
    assert_eq!(harness.retry_queue.message_count().await.unwrap(), 0);
    assert!(harness.retry_queue.in_flight().await.is_empty());
    assert!(harness
        .store
        .messages()
        .await
        .iter()
        .all(|m| m.status == MessageDeliveryStatus::Sending));
}

#[tokio::test]
async fn failed_retry_is_requeued_with_incremented_count() {
    let mock_server = MockServer::start().await;
    let harness = Harness::new(&mock_server.uri());

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;
    let batch = failed_batch(&harness).await;

    let outcome = coordinator(&harness).run(now()).await.unwrap();

    assert_eq!(
        outcome,
        RetryOutcome::Resent {
            batch_status: MessageBatchStatus::FailedRecoverable,
            retry_count: 0
        }
    );
    let item = harness.retry_queue.item().await.unwrap().unwrap();
    let request: RetryRequest = serde_json::from_str(&item.content).unwrap();
    assert_eq!(request, RetryRequest { message_batch_id: batch.id, retry_count: 1 });
}

#[tokio::test]
async fn batch_ends_unrecoverable_once_the_retry_limit_is_reached() {
    let mock_server = MockServer::start().await;
    let harness = Harness::new(&mock_server.uri());

    // The first send plus one per allowed retry.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(u64::from(harness.config.batch_retry_limit) + 1)
        .mount(&mock_server)
        .await;
    let batch = failed_batch(&harness).await;
    let coordinator = coordinator(&harness);

    for retry_count in 0..harness.config.batch_retry_limit {
        let outcome = coordinator.run(now()).await.unwrap();
        assert_eq!(
            outcome,
            RetryOutcome::Resent {
                batch_status: MessageBatchStatus::FailedRecoverable,
                retry_count
            }
        );
    }

    let result = coordinator.run(now()).await;

    assert_matches!(result, Err(NotificationsError::RetryLimitExceeded(id)) if id == batch.id);
    assert_eq!(
        result.unwrap_err().to_string(),
        format!("Message Batch with id {} not sent: Retry limit exceeded", batch.id)
    );
    let stored = harness.store.batches().await;
    assert_eq!(stored[0].status, MessageBatchStatus::FailedUnrecoverable);
    assert!(harness
        .store
        .messages()
        .await
        .iter()
        .all(|m| m.status == MessageDeliveryStatus::Failed));

    // Nothing left to retry.
    assert_eq!(coordinator.run(now()).await.unwrap(), RetryOutcome::QueueEmpty);
}

#[tokio::test]
async fn unknown_batch_is_reported_and_removed_from_the_queue() {
    let harness = Harness::new("http://localhost:8089");
    let missing = Uuid::new_v4();
    let request = RetryRequest { message_batch_id: missing, retry_count: 0 };
    harness
        .retry_queue
        .enqueue(&serde_json::to_string(&request).unwrap())
        .await
        .unwrap();

    let result = coordinator(&harness).run(now()).await;

    assert_matches!(result, Err(NotificationsError::BatchNotFound { id, .. }) if id == missing);
    assert_eq!(
        result.unwrap_err().to_string(),
        format!("Message Batch with id {} and status of 'failed_recoverable' not found", missing)
    );
    assert_eq!(harness.retry_queue.message_count().await.unwrap(), 0);
    assert!(harness.retry_queue.in_flight().await.is_empty());
}

#[tokio::test]
async fn sent_batch_is_not_retried() {
    let mock_server = MockServer::start().await;
    let harness = Harness::new(&mock_server.uri());

    Mock::given(method("POST"))
        .respond_with(accept_batch("notify-batch-3"))
        .expect(1)
        .mount(&mock_server)
        .await;
    let batch = failed_batch(&harness).await;
    assert_eq!(batch.status, MessageBatchStatus::Sent);

    let request = RetryRequest { message_batch_id: batch.id, retry_count: 0 };
    harness
        .retry_queue
        .enqueue(&serde_json::to_string(&request).unwrap())
        .await
        .unwrap();

    let result = coordinator(&harness).run(now()).await;

    assert_matches!(result, Err(NotificationsError::BatchNotFound { .. }));
}

#[tokio::test]
async fn malformed_retry_request_is_rejected() {
    let harness = Harness::new("http://localhost:8089");
    let queue: Arc<dyn MessageQueue> = harness.retry_queue.clone();
    queue
        .enqueue(r#"{"message_batch_id": "not-a-uuid", "retry_count": 0}"#)
        .await
        .unwrap();
    queue
        .enqueue(r#"{"message_batch_id": "6b1c8b7e-8e5e-4f57-9d0b-3f5b9b0c2a11", "retry_count": 0, "extra": 1}"#)
        .await
        .unwrap();

    let coordinator = coordinator(&harness);

    assert_matches!(coordinator.run(now()).await, Err(NotificationsError::InvalidRetryRequest(_)));
    assert_matches!(coordinator.run(now()).await, Err(NotificationsError::InvalidRetryRequest(_)));
    assert_eq!(queue.message_count().await.unwrap(), 0);
}
