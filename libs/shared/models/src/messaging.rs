// libs/shared/models/src/messaging.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Maximum length of status descriptions and idempotency keys.
pub const STATUS_FIELD_MAX_LENGTH: usize = 150;

// ==============================================================================
// MESSAGE BATCHES
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageBatchStatus {
    Unscheduled,
    Scheduled,
    Sent,
    FailedRecoverable,
    FailedUnrecoverable,
}

impl fmt::Display for MessageBatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageBatchStatus::Unscheduled => write!(f, "unscheduled"),
            MessageBatchStatus::Scheduled => write!(f, "scheduled"),
            MessageBatchStatus::Sent => write!(f, "sent"),
            MessageBatchStatus::FailedRecoverable => write!(f, "failed_recoverable"),
            MessageBatchStatus::FailedUnrecoverable => write!(f, "failed_unrecoverable"),
        }
    }
}

/// Multiple messages sent to the communications API together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageBatch {
    pub id: Uuid,
    pub notify_id: String,
    pub routing_plan_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub status: MessageBatchStatus,
    pub notify_errors: Option<Value>,
}

impl MessageBatch {
    pub fn new(routing_plan_id: Option<Uuid>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            notify_id: String::new(),
            routing_plan_id,
            created_at: now,
            scheduled_at: Some(now),
            sent_at: None,
            status: MessageBatchStatus::Scheduled,
            notify_errors: None,
        }
    }
}

impl fmt::Display for MessageBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageBatch {} - Status: {}", self.id, self.status)
    }
}

// ==============================================================================
// MESSAGES
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageDeliveryStatus {
    PendingEnrichment,
    Enriched,
    Sending,
    Delivered,
    Failed,
}

impl MessageDeliveryStatus {
    pub fn is_open(&self) -> bool {
        !matches!(self, MessageDeliveryStatus::Failed)
    }
}

/// A message sent to a participant about one appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub notify_id: String,
    pub batch_id: Option<Uuid>,
    pub appointment_id: Uuid,
    pub created_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub status: MessageDeliveryStatus,
}

impl Message {
    pub fn for_appointment(appointment_id: Uuid, batch_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            notify_id: String::new(),
            batch_id: Some(batch_id),
            appointment_id,
            created_at: Some(now),
            sent_at: None,
            status: MessageDeliveryStatus::PendingEnrichment,
        }
    }
}

// ==============================================================================
// STATUS EVENTS
// ==============================================================================

/// A status update event for one communication channel of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelStatus {
    pub id: Uuid,
    pub message_id: Uuid,
    pub channel: String,
    pub status: String,
    pub description: String,
    pub idempotency_key: String,
    pub status_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A status update event for a message as a whole.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageStatus {
    pub id: Uuid,
    pub message_id: Uuid,
    pub status: String,
    pub description: String,
    pub idempotency_key: String,
    pub status_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_status_uses_snake_case() {
        let json = serde_json::to_string(&MessageBatchStatus::FailedRecoverable).unwrap();
        assert_eq!(json, "\"failed_recoverable\"");
        assert_eq!(MessageBatchStatus::FailedUnrecoverable.to_string(), "failed_unrecoverable");
    }

    #[test]
    fn new_batch_is_scheduled() {
        let now = Utc::now();
        let batch = MessageBatch::new(None, now);
        assert_eq!(batch.status, MessageBatchStatus::Scheduled);
        assert_eq!(batch.scheduled_at, Some(now));
        assert!(batch.notify_id.is_empty());
    }

    #[test]
    fn only_failed_messages_are_closed() {
        assert!(MessageDeliveryStatus::PendingEnrichment.is_open());
        assert!(MessageDeliveryStatus::Delivered.is_open());
        assert!(!MessageDeliveryStatus::Failed.is_open());
    }
}
