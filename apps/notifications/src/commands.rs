use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use appointment_cell::{blob_storage_from_config, BlobStorage, CreateAppointmentsJob};
use message_queue_cell::{MessageQueue, RedisMessageQueue};
use notifications_cell::{
    BatchBuilder, MessageBatchService, NotifyApiClient, QueueMetricsCollector, RetryCoordinator, RetryOutcome,
    SendMessageBatchJob, StatusIngestor,
};
use shared_config::AppConfig;
use shared_database::SupabaseRepository;
use shared_utils::InsightsLogger;

fn repository(config: &AppConfig) -> Arc<SupabaseRepository> {
    Arc::new(SupabaseRepository::new(config))
}

async fn queue(config: &AppConfig, name: &str) -> anyhow::Result<Arc<dyn MessageQueue>> {
    let queue = RedisMessageQueue::new(config, name)
        .await
        .with_context(|| format!("connecting to queue {}", name))?;
    Ok(Arc::new(queue))
}

fn batch_service(
    config: &AppConfig,
    repository: &Arc<SupabaseRepository>,
    retry_queue: Arc<dyn MessageQueue>,
) -> Arc<MessageBatchService> {
    Arc::new(MessageBatchService::new(
        repository.clone(),
        repository.clone(),
        repository.clone(),
        retry_queue,
        NotifyApiClient::new(config),
        InsightsLogger::new(config),
    ))
}

pub async fn create_appointments(config: &AppConfig, date: NaiveDate, now: DateTime<Utc>) -> anyhow::Result<()> {
    let storage: Arc<dyn BlobStorage> = Arc::from(blob_storage_from_config(config)?);
    let repository = repository(config);
    let job = CreateAppointmentsJob::new(storage, repository.clone(), repository, config.timezone);

    let summary = job.run(date, now).await?;
    info!(
        "Processed {} extracts: {} created, {} cancelled, {} completed, {} skipped, {} rejected",
        summary.files, summary.created, summary.cancelled, summary.completed, summary.skipped, summary.rejected
    );
    Ok(())
}

pub async fn send_message_batch(config: &AppConfig, routing_plan_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<()> {
    let repository = repository(config);
    let retry_queue = queue(config, &config.retry_queue_name).await?;
    let builder = BatchBuilder::new(repository.clone(), repository.clone(), config.timezone);
    let job = SendMessageBatchJob::new(builder, batch_service(config, &repository, retry_queue));

    if let Some(batch) = job.run(routing_plan_id, now).await? {
        info!("Finished sending {} ({})", batch, batch.status);
    }
    Ok(())
}

pub async fn retry_failed_message_batch(config: &AppConfig, now: DateTime<Utc>) -> anyhow::Result<()> {
    let repository = repository(config);
    let retry_queue = queue(config, &config.retry_queue_name).await?;
    let coordinator = RetryCoordinator::new(
        retry_queue.clone(),
        repository.clone(),
        batch_service(config, &repository, retry_queue),
        config.batch_retry_limit,
    );

    match coordinator.run(now).await? {
        RetryOutcome::QueueEmpty => {}
        RetryOutcome::Resent { batch_status, retry_count } => {
            info!("Retry {} finished with batch status {}", retry_count, batch_status);
        }
    }
    Ok(())
}

pub async fn save_message_status(config: &AppConfig, now: DateTime<Utc>) -> anyhow::Result<()> {
    let repository = repository(config);
    let status_queue = queue(config, &config.status_queue_name).await?;
    let ingestor = StatusIngestor::new(status_queue, repository.clone(), repository);

    let summary = ingestor.run(now).await?;
    info!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

pub async fn collect_metrics(config: &AppConfig) -> anyhow::Result<()> {
    let queues = vec![
        queue(config, &config.retry_queue_name).await?,
        queue(config, &config.status_queue_name).await?,
    ];

    QueueMetricsCollector::new(config.environment.clone())
        .collect(&queues)
        .await?;
    Ok(())
}
