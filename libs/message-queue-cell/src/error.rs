use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue {queue} is not configured: {reason}")]
    NotConfigured { queue: String, reason: String },

    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    PoolError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Queue item {0} is not in flight")]
    ItemNotInFlight(String),
}
