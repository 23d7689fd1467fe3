use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::QueueError;

/// One message on a durable queue. `content` is the producer's payload,
/// usually a JSON document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    pub id: Uuid,
    pub content: String,
    pub inserted_at: DateTime<Utc>,
    /// The stored form, exactly as read from the backing list.
    #[serde(skip)]
    pub(crate) raw: String,
}

impl QueueItem {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            inserted_at: Utc::now(),
            raw: String::new(),
        }
    }

    /// Reads a stored entry. Entries written by other producers are not
    /// wrapped in `{id, content, inserted_at}`; the whole entry is then the
    /// content.
    pub fn from_raw(raw: String) -> Self {
        let item = match serde_json::from_str::<QueueItem>(&raw) {
            Ok(item) => item,
            Err(_) => QueueItem::new(raw.clone()),
        };
        Self { raw, ..item }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// A named FIFO work queue with at-least-once delivery.
///
/// `item` hands out the oldest pending item and keeps it in flight until
/// `delete` is called with it.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    fn name(&self) -> &str;

    async fn enqueue(&self, content: &str) -> Result<QueueItem, QueueError>;

    async fn item(&self) -> Result<Option<QueueItem>, QueueError>;

    async fn delete(&self, item: &QueueItem) -> Result<(), QueueError>;

    /// Pending items, oldest first, without receiving them.
    async fn peek(&self, max_items: usize) -> Result<Vec<QueueItem>, QueueError>;

    /// Number of items waiting to be received.
    async fn message_count(&self) -> Result<u64, QueueError>;
}
