// libs/notifications-cell/src/services/send.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use shared_models::MessageBatch;

use crate::models::NotificationsError;
use crate::services::batch_builder::BatchBuilder;
use crate::services::batches::MessageBatchService;

/// Builds today's batch and sends it once. Failures are left to the retry job.
pub struct SendMessageBatchJob {
    builder: BatchBuilder,
    service: Arc<MessageBatchService>,
}

impl SendMessageBatchJob {
    pub fn new(builder: BatchBuilder, service: Arc<MessageBatchService>) -> Self {
        Self { builder, service }
    }

    /// Returns `None` when no appointments are due.
    #[instrument(skip(self))]
    pub async fn run(&self, routing_plan_id: Uuid, now: DateTime<Utc>) -> Result<Option<MessageBatch>, NotificationsError> {
        let mut batch = match self.builder.build(routing_plan_id, now).await {
            Ok((batch, _)) => batch,
            Err(NotificationsError::NothingToBatch) => {
                info!("No appointments found to batch.");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.service.send(&mut batch, 0, now).await?;
        info!("{} after first send", batch);
        Ok(Some(batch))
    }
}
