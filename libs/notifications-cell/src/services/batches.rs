// libs/notifications-cell/src/services/batches.rs
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use message_queue_cell::MessageQueue;
use shared_database::{AppointmentRepository, ClinicRepository, MessageBatchRepository};
use shared_models::{Appointment, Clinic, Message, MessageBatch, MessageBatchStatus, MessageDeliveryStatus};
use shared_utils::InsightsLogger;

use crate::models::{is_recoverable_status, DeliveryOutcome, NotificationsError, NotifyBatchResponse, RetryRequest};
use crate::services::delivery::{NotifyApiClient, OutboundMessage};

/// Sends stored batches and records the result on the batch and its
/// messages. Recoverable failures are queued for the retry job.
pub struct MessageBatchService {
    appointments: Arc<dyn AppointmentRepository>,
    clinics: Arc<dyn ClinicRepository>,
    batches: Arc<dyn MessageBatchRepository>,
    retry_queue: Arc<dyn MessageQueue>,
    client: NotifyApiClient,
    logger: InsightsLogger,
}

impl MessageBatchService {
    pub fn new(
        appointments: Arc<dyn AppointmentRepository>,
        clinics: Arc<dyn ClinicRepository>,
        batches: Arc<dyn MessageBatchRepository>,
        retry_queue: Arc<dyn MessageQueue>,
        client: NotifyApiClient,
        logger: InsightsLogger,
    ) -> Self {
        Self {
            appointments,
            clinics,
            batches,
            retry_queue,
            client,
            logger,
        }
    }

    /// Sends the batch and applies the outcome. `retry_count` is the count a
    /// recoverable failure is queued with.
    pub async fn send(
        &self,
        batch: &mut MessageBatch,
        retry_count: u32,
        now: DateTime<Utc>,
    ) -> Result<MessageBatchStatus, NotificationsError> {
        let messages = self.batches.messages_for_batch(batch.id).await?;
        let outbound = self.outbound_messages(messages).await?;

        match self.client.send_message_batch(batch, &outbound).await {
            DeliveryOutcome::Sent { response, unexpected_body } => {
                self.mark_sent(batch, &response, unexpected_body, now).await?;
            }
            DeliveryOutcome::Failed { status, body } => {
                self.mark_failed(batch, status, body, retry_count).await?;
            }
        }
        Ok(batch.status)
    }

    /// Loads every appointment and clinic the batch needs in two lookups.
    async fn outbound_messages(&self, messages: Vec<Message>) -> Result<Vec<OutboundMessage>, NotificationsError> {
        let appointment_ids: Vec<Uuid> = unique(messages.iter().map(|m| m.appointment_id));
        let appointments: HashMap<Uuid, Appointment> = self
            .appointments
            .get_appointments(&appointment_ids)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();

        let clinic_ids: Vec<Uuid> = unique(appointments.values().map(|a| a.clinic_id));
        let clinics: HashMap<Uuid, Clinic> = self
            .clinics
            .get_clinics(&clinic_ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut outbound = Vec::with_capacity(messages.len());
        for message in messages {
            let appointment = appointments.get(&message.appointment_id).cloned().ok_or_else(|| {
                NotificationsError::PayloadError(format!("Appointment {} not found", message.appointment_id))
            })?;
            let clinic = clinics.get(&appointment.clinic_id).cloned().ok_or_else(|| {
                NotificationsError::PayloadError(format!("Clinic {} not found", appointment.clinic_id))
            })?;
            outbound.push(OutboundMessage { message, appointment, clinic });
        }
        Ok(outbound)
    }

    pub async fn mark_sent(
        &self,
        batch: &mut MessageBatch,
        response: &NotifyBatchResponse,
        unexpected_body: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<(), NotificationsError> {
        batch.status = MessageBatchStatus::Sent;
        batch.notify_id = response.data.id.clone();
        batch.sent_at = Some(now);
        // Kept for diagnosis when the acceptance body had an unexpected shape.
        batch.notify_errors = unexpected_body;
        self.batches.update_batch(batch).await?;

        for receipt in &response.data.attributes.messages {
            let Ok(message_id) = receipt.message_reference.parse() else {
                warn!("Ignoring receipt with unknown message reference {}", receipt.message_reference);
                continue;
            };
            match self.batches.find_message(message_id).await? {
                Some(mut message) if message.batch_id == Some(batch.id) => {
                    message.notify_id = receipt.id.clone();
                    message.sent_at = Some(now);
                    message.status = MessageDeliveryStatus::Sending;
                    self.batches.update_message(&message).await?;
                }
                _ => warn!("Receipt for message {} does not match {}", receipt.message_reference, batch),
            }
        }

        info!("{} sent", batch);
        Ok(())
    }

    pub async fn mark_failed(
        &self,
        batch: &mut MessageBatch,
        status: Option<u16>,
        body: Value,
        retry_count: u32,
    ) -> Result<(), NotificationsError> {
        batch.notify_errors = Some(body);

        if is_recoverable_status(status) {
            batch.status = MessageBatchStatus::FailedRecoverable;
            self.batches.update_batch(batch).await?;

            let request = RetryRequest {
                message_batch_id: batch.id,
                retry_count,
            };
            let content = serde_json::to_string(&request)
                .map_err(|e| NotificationsError::InvalidRetryRequest(e.to_string()))?;
            self.retry_queue.enqueue(&content).await?;
            info!("{} queued for retry {}", batch, retry_count);
        } else {
            self.mark_unrecoverable(batch).await?;
        }

        self.logger.custom_event(
            &format!("{} marked as failed (status {:?})", batch, status),
            "batch_marked_as_failed",
        );
        Ok(())
    }

    /// Gives up on the batch: no further sends, and its messages are failed.
    pub async fn mark_unrecoverable(&self, batch: &mut MessageBatch) -> Result<(), NotificationsError> {
        batch.status = MessageBatchStatus::FailedUnrecoverable;
        self.batches.update_batch(batch).await?;

        for mut message in self.batches.messages_for_batch(batch.id).await? {
            message.status = MessageDeliveryStatus::Failed;
            self.batches.update_message(&message).await?;
        }
        Ok(())
    }
}

fn unique(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = ids.collect();
    ids.sort();
    ids.dedup();
    ids
}
