// =====================================================================================
// QUEUE METRICS
// =====================================================================================

use std::sync::Arc;
use tracing::{info, instrument};

use message_queue_cell::MessageQueue;

use crate::models::{NotificationsError, QueueGauge};

pub const QUEUE_LENGTH_UNIT: &str = "messages";
pub const QUEUE_LENGTH_DESCRIPTION: &str = "Queue length";

/// Publishes the length of each queue as a gauge on the `metrics` target.
#[derive(Debug, Clone)]
pub struct QueueMetricsCollector {
    environment: String,
}

impl QueueMetricsCollector {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    #[instrument(skip(self, queues))]
    pub async fn collect(&self, queues: &[Arc<dyn MessageQueue>]) -> Result<Vec<QueueGauge>, NotificationsError> {
        let mut gauges = Vec::with_capacity(queues.len());

        for queue in queues {
            let gauge = QueueGauge {
                name: queue.name().to_string(),
                unit: QUEUE_LENGTH_UNIT.to_string(),
                description: QUEUE_LENGTH_DESCRIPTION.to_string(),
                environment: self.environment.clone(),
                value: queue.message_count().await?,
            };

            info!(
                target: "metrics",
                name = %gauge.name,
                unit = %gauge.unit,
                description = %gauge.description,
                environment = %gauge.environment,
                value = gauge.value,
                "queue_name"
            );
            gauges.push(gauge);
        }

        Ok(gauges)
    }
}
