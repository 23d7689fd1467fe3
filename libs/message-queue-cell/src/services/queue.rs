use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::{MessageQueue, QueueError, QueueItem};
use shared_config::AppConfig;

/// Redis-backed queue. Pending items live in the list `{name}`; received
/// items are moved atomically to `{name}:processing` and stay there until
/// deleted.
///
/// Items received but never deleted (a crashed job) remain in the processing
/// list and are not redelivered automatically.
pub struct RedisMessageQueue {
    pool: Pool,
    name: String,
    pending_key: String,
    processing_key: String,
}

impl std::fmt::Debug for RedisMessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisMessageQueue")
            .field("name", &self.name)
            .field("pending_key", &self.pending_key)
            .field("processing_key", &self.processing_key)
            .finish_non_exhaustive()
    }
}

impl RedisMessageQueue {
    pub async fn new(config: &AppConfig, name: &str) -> Result<Self, QueueError> {
        let redis_url = config.redis_url.clone().ok_or_else(|| QueueError::NotConfigured {
            queue: name.to_string(),
            reason: "REDIS_URL is not set".to_string(),
        })?;

        let pool = Self::create_pool(&redis_url)?;

        // Test connection
        let mut conn = pool
            .get()
            .await
            .map_err(|e| QueueError::PoolError(format!("Failed to connect to Redis: {}", e)))?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis queue {} initialized", name);

        Ok(Self::with_pool(pool, name))
    }

    pub fn with_pool(pool: Pool, name: &str) -> Self {
        Self {
            pool,
            name: name.to_string(),
            pending_key: name.to_string(),
            processing_key: format!("{}:processing", name),
        }
    }

    pub fn create_pool(redis_url: &str) -> Result<Pool, QueueError> {
        Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| QueueError::PoolError(format!("Pool creation error: {}", e)))
    }

    pub fn processing_key(&self) -> &str {
        &self.processing_key
    }

    async fn get_connection(&self) -> Result<Connection, QueueError> {
        self.pool
            .get()
            .await
            .map_err(|e| QueueError::PoolError(format!("Failed to get Redis connection: {}", e)))
    }
}

#[async_trait]
impl MessageQueue for RedisMessageQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, content: &str) -> Result<QueueItem, QueueError> {
        let mut conn = self.get_connection().await?;
        let mut item = QueueItem::new(content);
        item.raw = serde_json::to_string(&item)?;

        let _: () = conn.lpush(&self.pending_key, &item.raw).await?;

        debug!("Item {} enqueued on {}", item.id, self.name);
        Ok(item)
    }

    async fn item(&self) -> Result<Option<QueueItem>, QueueError> {
        let mut conn = self.get_connection().await?;

        // Atomic pop from the pending list and push to the processing list
        let raw: Option<String> = conn.rpoplpush(&self.pending_key, &self.processing_key).await?;

        match raw {
            Some(raw) => {
                let item = QueueItem::from_raw(raw);
                debug!("Item {} received from {}", item.id, self.name);
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, item: &QueueItem) -> Result<(), QueueError> {
        let mut conn = self.get_connection().await?;

        // LREM matches the exact stored string.
        let raw = if item.raw.is_empty() {
            serde_json::to_string(item)?
        } else {
            item.raw.clone()
        };
        let removed: i64 = conn.lrem(&self.processing_key, 1, raw).await?;
        if removed == 0 {
            return Err(QueueError::ItemNotInFlight(item.id.to_string()));
        }

        debug!("Item {} deleted from {}", item.id, self.name);
        Ok(())
    }

    async fn peek(&self, max_items: usize) -> Result<Vec<QueueItem>, QueueError> {
        if max_items == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.get_connection().await?;

        // The oldest items sit at the tail of the list.
        let start = -(max_items as isize);
        let raw: Vec<String> = conn.lrange(&self.pending_key, start, -1).await?;

        Ok(raw.into_iter().rev().map(QueueItem::from_raw).collect())
    }

    async fn message_count(&self) -> Result<u64, QueueError> {
        let mut conn = self.get_connection().await?;
        let count: u64 = conn.llen(&self.pending_key).await?;
        Ok(count)
    }
}
