#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::{Request, ResponseTemplate};

use message_queue_cell::InMemoryQueue;
use notifications_cell::{MessageBatchService, NotifyApiClient};
use shared_config::AppConfig;
use shared_database::{AppointmentRepository, ClinicRepository, InMemoryStore};
use shared_models::{Appointment, AppointmentStatus};
use shared_utils::test_utils::{AppointmentFactory, ClinicFactory, TestConfig};
use shared_utils::InsightsLogger;

pub struct Harness {
    pub config: AppConfig,
    pub store: Arc<InMemoryStore>,
    pub retry_queue: Arc<InMemoryQueue>,
}

impl Harness {
    pub fn new(notify_api_base_url: &str) -> Self {
        let config = TestConfig {
            notify_api_base_url: notify_api_base_url.to_string(),
            ..Default::default()
        }
        .to_app_config();

        Self {
            retry_queue: Arc::new(InMemoryQueue::new(&config.retry_queue_name)),
            store: Arc::new(InMemoryStore::new()),
            config,
        }
    }

    pub fn service(&self) -> Arc<MessageBatchService> {
        Arc::new(MessageBatchService::new(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.retry_queue.clone(),
            NotifyApiClient::new(&self.config),
            InsightsLogger::new(&self.config),
        ))
    }

    pub async fn booked_appointment(&self, nbss_id: &str, starts_at: DateTime<Utc>) -> Appointment {
        let (clinic, _) = self
            .store
            .upsert_clinic(ClinicFactory::details("KMK", "BU003"), Utc::now())
            .await
            .unwrap();
        let appointment = AppointmentFactory::build(clinic.id, nbss_id, starts_at, AppointmentStatus::Booked);
        self.store.insert_appointment(&appointment).await.unwrap();
        appointment
    }
}

/// Answers a batch send with 201, acknowledging every message reference in
/// the request.
pub fn accept_batch(notify_batch_id: &'static str) -> impl Fn(&Request) -> ResponseTemplate {
    move |request: &Request| {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let messages: Vec<Value> = body["data"]["attributes"]["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| {
                let reference = m["messageReference"].as_str().unwrap();
                json!({ "messageReference": reference, "id": format!("notify-{}", reference) })
            })
            .collect();

        ResponseTemplate::new(201).set_body_json(json!({
            "data": {
                "type": "MessageBatch",
                "id": notify_batch_id,
                "attributes": {
                    "messageBatchReference": body["data"]["attributes"]["messageBatchReference"],
                    "routingPlan": { "id": body["data"]["attributes"]["routingPlanId"], "version": "1" },
                    "messages": messages
                }
            }
        }))
    }
}
