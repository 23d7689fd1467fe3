// libs/notifications-cell/src/services/retry.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use message_queue_cell::MessageQueue;
use shared_database::MessageBatchRepository;
use shared_models::MessageBatchStatus;

use crate::models::{NotificationsError, RetryRequest};
use crate::services::batches::MessageBatchService;

/// What one retry run did.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    QueueEmpty,
    Resent { batch_status: MessageBatchStatus, retry_count: u32 },
}

/// Takes one item off the retry queue and resends its batch, up to the
/// configured number of retries.
///
/// The queue item is deleted before the batch is looked at, so a crash
/// between the delete and saving the batch drops the retry.
pub struct RetryCoordinator {
    retry_queue: Arc<dyn MessageQueue>,
    batches: Arc<dyn MessageBatchRepository>,
    service: Arc<MessageBatchService>,
    retry_limit: u32,
}

impl RetryCoordinator {
    pub fn new(
        retry_queue: Arc<dyn MessageQueue>,
        batches: Arc<dyn MessageBatchRepository>,
        service: Arc<MessageBatchService>,
        retry_limit: u32,
    ) -> Self {
        Self {
            retry_queue,
            batches,
            service,
            retry_limit,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RetryOutcome, NotificationsError> {
        info!("Retry Failed Message Batch Command started");

        if let Ok(pending) = self.retry_queue.peek(32).await {
            debug!("Retry queue items: {:?}", pending.iter().map(|i| &i.content).collect::<Vec<_>>());
        }

        let Some(item) = self.retry_queue.item().await? else {
            info!("No messages on queue");
            return Ok(RetryOutcome::QueueEmpty);
        };

        self.retry_queue.delete(&item).await?;

        let request: RetryRequest = serde_json::from_str(&item.content)
            .map_err(|e| NotificationsError::InvalidRetryRequest(format!("{}: {}", item.content, e)))?;
        info!(
            "Queue message {} for MessageBatch with id {} deleted from queue",
            item.id, request.message_batch_id
        );

        let mut batch = self
            .batches
            .find_batch(request.message_batch_id, Some(MessageBatchStatus::FailedRecoverable))
            .await?
            .ok_or(NotificationsError::BatchNotFound {
                id: request.message_batch_id,
                status: MessageBatchStatus::FailedRecoverable,
            })?;

        if request.retry_count >= self.retry_limit {
            error!(
                "Failed Message Batch with id {} not sent: Retry limit exceeded",
                request.message_batch_id
            );
            self.service.mark_unrecoverable(&mut batch).await?;
            return Err(NotificationsError::RetryLimitExceeded(request.message_batch_id));
        }

        info!(
            "Retrying Message Batch with id {} with retry count {}",
            request.message_batch_id, request.retry_count
        );
        let batch_status = self.service.send(&mut batch, request.retry_count + 1, now).await?;

        Ok(RetryOutcome::Resent {
            batch_status,
            retry_count: request.retry_count,
        })
    }
}
