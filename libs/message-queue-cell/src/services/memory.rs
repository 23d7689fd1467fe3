use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::RwLock;

use crate::{MessageQueue, QueueError, QueueItem};

#[derive(Default)]
struct Lists {
    pending: VecDeque<QueueItem>,
    processing: Vec<QueueItem>,
}

/// Process-local queue with the same receive/delete semantics as
/// `RedisMessageQueue`.
pub struct InMemoryQueue {
    name: String,
    lists: RwLock<Lists>,
}

impl InMemoryQueue {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            lists: RwLock::new(Lists::default()),
        }
    }

    pub async fn in_flight(&self) -> Vec<QueueItem> {
        self.lists.read().await.processing.clone()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, content: &str) -> Result<QueueItem, QueueError> {
        let item = QueueItem::new(content);
        self.lists.write().await.pending.push_back(item.clone());
        Ok(item)
    }

    async fn item(&self) -> Result<Option<QueueItem>, QueueError> {
        let mut lists = self.lists.write().await;
        let item = lists.pending.pop_front();
        if let Some(item) = &item {
            lists.processing.push(item.clone());
        }
        Ok(item)
    }

    async fn delete(&self, item: &QueueItem) -> Result<(), QueueError> {
        let mut lists = self.lists.write().await;
        let position = lists
            .processing
            .iter()
            .position(|i| i.id == item.id)
            .ok_or_else(|| QueueError::ItemNotInFlight(item.id.to_string()))?;
        lists.processing.remove(position);
        Ok(())
    }

    async fn peek(&self, max_items: usize) -> Result<Vec<QueueItem>, QueueError> {
        Ok(self.lists.read().await.pending.iter().take(max_items).cloned().collect())
    }

    async fn message_count(&self) -> Result<u64, QueueError> {
        Ok(self.lists.read().await.pending.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn items_are_received_oldest_first() {
        let queue = InMemoryQueue::new("test-queue");
        queue.enqueue("first").await.unwrap();
        queue.enqueue("second").await.unwrap();

        assert_eq!(queue.item().await.unwrap().unwrap().content, "first");
        assert_eq!(queue.item().await.unwrap().unwrap().content, "second");
        assert!(queue.item().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn received_items_stay_in_flight_until_deleted() {
        let queue = InMemoryQueue::new("test-queue");
        queue.enqueue("payload").await.unwrap();

        let item = queue.item().await.unwrap().unwrap();
        assert_eq!(queue.message_count().await.unwrap(), 0);
        assert_eq!(queue.in_flight().await.len(), 1);

        queue.delete(&item).await.unwrap();
        assert!(queue.in_flight().await.is_empty());
        assert_matches!(queue.delete(&item).await, Err(QueueError::ItemNotInFlight(_)));
    }

    #[tokio::test]
    async fn peek_does_not_receive() {
        let queue = InMemoryQueue::new("test-queue");
        for content in ["a", "b", "c"] {
            queue.enqueue(content).await.unwrap();
        }

        let peeked: Vec<String> = queue.peek(2).await.unwrap().into_iter().map(|i| i.content).collect();

        assert_eq!(peeked, vec!["a", "b"]);
        assert_eq!(queue.message_count().await.unwrap(), 3);
    }
}
