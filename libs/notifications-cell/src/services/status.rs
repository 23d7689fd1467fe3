// libs/notifications-cell/src/services/status.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use message_queue_cell::{MessageQueue, QueueItem};
use shared_database::{MessageBatchRepository, StatusRepository};
use shared_models::{ChannelStatus, MessageStatus, STATUS_FIELD_MAX_LENGTH};

use crate::models::{IngestSummary, NotificationsError, StatusEnvelope, StatusRecord};

/// Channel names and status codes; descriptions and keys use `STATUS_FIELD_MAX_LENGTH`.
pub const MAX_STATUS_LENGTH: usize = 50;

enum Saved {
    Saved,
    Duplicate,
    Invalid,
}

/// Drains the status-update queue into channel and message status records.
pub struct StatusIngestor {
    status_queue: Arc<dyn MessageQueue>,
    batches: Arc<dyn MessageBatchRepository>,
    statuses: Arc<dyn StatusRepository>,
}

impl StatusIngestor {
    pub fn new(
        status_queue: Arc<dyn MessageQueue>,
        batches: Arc<dyn MessageBatchRepository>,
        statuses: Arc<dyn StatusRepository>,
    ) -> Self {
        Self {
            status_queue,
            batches,
            statuses,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<IngestSummary, NotificationsError> {
        info!("Save Message Status Command started");
        let mut summary = IngestSummary::default();

        while let Some(item) = self.status_queue.item().await? {
            debug!("Processing message status update {}", item.id);
            self.status_queue.delete(&item).await?;
            summary.received += 1;

            let Some(record) = decode(&item) else {
                summary.undecodable += 1;
                continue;
            };

            match self.save(&record, now).await? {
                Saved::Saved => {
                    summary.saved += 1;
                    info!("Message status update {} saved", item.id);
                }
                Saved::Duplicate => summary.duplicates += 1,
                Saved::Invalid => summary.invalid += 1,
            }
        }

        info!(
            "Status updates: {} received, {} saved, {} duplicates, {} invalid, {} undecodable",
            summary.received, summary.saved, summary.duplicates, summary.invalid, summary.undecodable
        );
        Ok(summary)
    }

    async fn save(&self, record: &StatusRecord, now: DateTime<Utc>) -> Result<Saved, NotificationsError> {
        let reference = record.message_reference();
        let message_id: Uuid = reference
            .parse()
            .map_err(|_| NotificationsError::MessageNotFound(reference.to_string()))?;
        let message = self
            .batches
            .find_message(message_id)
            .await?
            .ok_or_else(|| NotificationsError::MessageNotFound(reference.to_string()))?;

        let key = record.idempotency_key();

        let inserted = match record {
            StatusRecord::ChannelStatus { attributes, .. } => {
                if self.statuses.channel_status_exists(key).await? {
                    return Ok(Saved::Duplicate);
                }
                let status = ChannelStatus {
                    id: Uuid::new_v4(),
                    message_id: message.id,
                    channel: attributes.channel.clone(),
                    status: attributes.supplier_status.clone(),
                    description: attributes.channel_status_description.clone(),
                    idempotency_key: key.to_string(),
                    status_updated_at: match parse_timestamp(&attributes.timestamp) {
                        Some(ts) => ts,
                        None => return Ok(Saved::Invalid),
                    },
                    created_at: now,
                };
                if let Err(reason) = validate_channel_status(&status) {
                    error!("Invalid channel status {}: {}", key, reason);
                    return Ok(Saved::Invalid);
                }
                self.statuses.insert_channel_status(&status).await
            }
            StatusRecord::MessageStatus { attributes, .. } => {
                if self.statuses.message_status_exists(key).await? {
                    return Ok(Saved::Duplicate);
                }
                let status = MessageStatus {
                    id: Uuid::new_v4(),
                    message_id: message.id,
                    status: attributes.message_status.clone(),
                    description: attributes.message_status_description.clone(),
                    idempotency_key: key.to_string(),
                    status_updated_at: match parse_timestamp(&attributes.timestamp) {
                        Some(ts) => ts,
                        None => return Ok(Saved::Invalid),
                    },
                    created_at: now,
                };
                if let Err(reason) = validate_message_status(&status) {
                    error!("Invalid message status {}: {}", key, reason);
                    return Ok(Saved::Invalid);
                }
                self.statuses.insert_message_status(&status).await
            }
        };

        match inserted {
            Ok(()) => Ok(Saved::Saved),
            // Another run stored the same key between the check and the insert.
            Err(e) if e.is_conflict() => {
                debug!("Duplicate status update {}: {}", key, e);
                Ok(Saved::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn decode(item: &QueueItem) -> Option<StatusRecord> {
    let envelope: StatusEnvelope = match serde_json::from_str(&item.content) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Dropping undecodable status update {}: {}", item.id, e);
            return None;
        }
    };

    let record = envelope.data.into_iter().next();
    if record.is_none() {
        warn!("Dropping status update {} with no data", item.id);
    }
    record
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            error!("Invalid status timestamp '{}': {}", value, e);
            None
        }
    }
}

fn check(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    if value.chars().count() > max {
        return Err(format!("{} must be at most {} characters", field, max));
    }
    Ok(())
}

pub fn validate_channel_status(status: &ChannelStatus) -> Result<(), String> {
    check("channel", &status.channel, MAX_STATUS_LENGTH)?;
    check("status", &status.status, MAX_STATUS_LENGTH)?;
    check("description", &status.description, STATUS_FIELD_MAX_LENGTH)?;
    check("idempotency_key", &status.idempotency_key, STATUS_FIELD_MAX_LENGTH)
}

pub fn validate_message_status(status: &MessageStatus) -> Result<(), String> {
    check("status", &status.status, MAX_STATUS_LENGTH)?;
    check("description", &status.description, STATUS_FIELD_MAX_LENGTH)?;
    check("idempotency_key", &status.idempotency_key, STATUS_FIELD_MAX_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_status(status: &str, description: &str) -> MessageStatus {
        MessageStatus {
            id: Uuid::new_v4(),
            message_id: Uuid::new_v4(),
            status: status.to_string(),
            description: description.to_string(),
            idempotency_key: "key-1".to_string(),
            status_updated_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn accepts_fields_at_their_limits() {
        let status = message_status(&"s".repeat(50), &"d".repeat(150));
        assert!(validate_message_status(&status).is_ok());
    }

    #[test]
    fn rejects_long_or_empty_fields() {
        assert!(validate_message_status(&message_status(&"s".repeat(51), "ok")).is_err());
        assert!(validate_message_status(&message_status("delivered", &"d".repeat(151))).is_err());
        assert!(validate_message_status(&message_status("", "ok")).is_err());
    }

    #[test]
    fn timestamps_must_be_rfc3339() {
        assert!(parse_timestamp("2025-07-21T10:15:30.123Z").is_some());
        assert!(parse_timestamp("2025-07-21T11:15:30+01:00").is_some());
        assert!(parse_timestamp("21/07/2025 10:15").is_none());
    }
}
