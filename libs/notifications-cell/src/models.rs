// libs/notifications-cell/src/models.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use message_queue_cell::QueueError;
use shared_models::{AppError, MessageBatchStatus};

// ==============================================================================
// RETRY QUEUE
// ==============================================================================

/// Body of a retry queue item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RetryRequest {
    pub message_batch_id: Uuid,
    pub retry_count: u32,
}

// ==============================================================================
// COMMUNICATIONS API
// ==============================================================================

/// Body of a 201 response to a batch send. Only `data` is required; missing
/// ids and receipts decode as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotifyBatchResponse {
    pub data: NotifyBatchData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotifyBatchData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: NotifyBatchAttributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotifyBatchAttributes {
    #[serde(default)]
    pub messages: Vec<NotifyMessageReceipt>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotifyMessageReceipt {
    pub message_reference: String,
    pub id: String,
}

/// Result of one attempt to send a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Any 201. `unexpected_body` holds the raw body when it did not have the
    /// expected shape.
    Sent {
        response: NotifyBatchResponse,
        unexpected_body: Option<Value>,
    },
    /// `status` is absent when no response was received.
    Failed { status: Option<u16>, body: Value },
}

/// Failures worth retrying: timeouts, throttling, server errors and requests
/// that never got a response.
pub fn is_recoverable_status(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(code) => matches!(code, 408 | 425 | 429) || (500..600).contains(&code),
    }
}

// ==============================================================================
// STATUS EVENTS
// ==============================================================================

/// `{"data": [{"type": ..., "attributes": {...}, "meta": {...}}]}`
#[derive(Debug, Clone, Deserialize)]
pub struct StatusEnvelope {
    pub data: Vec<StatusRecord>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum StatusRecord {
    ChannelStatus {
        attributes: ChannelStatusAttributes,
        meta: StatusMeta,
    },
    MessageStatus {
        attributes: MessageStatusAttributes,
        meta: StatusMeta,
    },
}

impl StatusRecord {
    pub fn message_reference(&self) -> &str {
        match self {
            StatusRecord::ChannelStatus { attributes, .. } => &attributes.message_reference,
            StatusRecord::MessageStatus { attributes, .. } => &attributes.message_reference,
        }
    }

    pub fn idempotency_key(&self) -> &str {
        match self {
            StatusRecord::ChannelStatus { meta, .. } | StatusRecord::MessageStatus { meta, .. } => {
                &meta.idempotency_key
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatusAttributes {
    pub message_reference: String,
    pub channel: String,
    pub channel_status_description: String,
    pub supplier_status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatusAttributes {
    pub message_reference: String,
    pub message_status: String,
    pub message_status_description: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusMeta {
    pub idempotency_key: String,
}

/// Totals for one save-message-status run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestSummary {
    pub received: usize,
    pub saved: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub undecodable: usize,
}

// ==============================================================================
// METRICS
// ==============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueueGauge {
    pub name: String,
    pub unit: String,
    pub description: String,
    pub environment: String,
    pub value: u64,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum NotificationsError {
    #[error("No appointments found to batch")]
    NothingToBatch,

    #[error("Message Batch with id {id} and status of '{status}' not found")]
    BatchNotFound { id: Uuid, status: MessageBatchStatus },

    #[error("Message Batch with id {0} not sent: Retry limit exceeded")]
    RetryLimitExceeded(Uuid),

    #[error("Message {0} not found")]
    MessageNotFound(String),

    #[error("Invalid retry request: {0}")]
    InvalidRetryRequest(String),

    #[error("Cannot build batch payload: {0}")]
    PayloadError(String),

    #[error(transparent)]
    Repository(#[from] AppError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
