use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{Appointment, AppointmentStatus, ClinicDetails, Message};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub notify_api_base_url: String,
    pub batch_retry_limit: u32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test-service-key".to_string(),
            notify_api_base_url: "http://localhost:8089".to_string(),
            batch_retry_limit: 5,
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            redis_url: None,
            notify_api_base_url: self.notify_api_base_url.clone(),
            notify_api_key: "test-notify-key".to_string(),
            blob_container_name: "notifications-extracts".to_string(),
            blob_storage_path: None,
            environment: "test".to_string(),
            batch_retry_limit: self.batch_retry_limit,
            timezone: chrono_tz::Europe::London,
            retry_queue_name: shared_config::DEFAULT_RETRY_QUEUE_NAME.to_string(),
            status_queue_name: shared_config::DEFAULT_STATUS_QUEUE_NAME.to_string(),
            insights_logger_name: shared_config::DEFAULT_LOGGER_NAME.to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct ClinicFactory;

impl ClinicFactory {
    pub fn details(bso_code: &str, code: &str) -> ClinicDetails {
        ClinicDetails {
            code: code.to_string(),
            bso_code: bso_code.to_string(),
            name: "BREAST CARE UNIT".to_string(),
            alt_name: "BREAST CARE UNIT".to_string(),
            holding_clinic: false,
            location_code: "MDSMKH".to_string(),
            address_line_1: "BREAST CARE UNIT".to_string(),
            address_line_2: "MILTON KEYNES HOSPITAL".to_string(),
            address_line_3: "STANDING WAY".to_string(),
            address_line_4: "MILTON KEYNES".to_string(),
            address_line_5: "MK6 5LD".to_string(),
            postcode: "MK6 5LD".to_string(),
        }
    }
}

pub struct AppointmentFactory;

impl AppointmentFactory {
    pub fn build(
        clinic_id: Uuid,
        nbss_id: &str,
        starts_at: DateTime<Utc>,
        status: AppointmentStatus,
    ) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            nbss_id: nbss_id.to_string(),
            nhs_number: 9449305552,
            number: "1".to_string(),
            batch_id: "KMK001326".to_string(),
            clinic_id,
            episode_started_at: None,
            episode_type: "S".to_string(),
            starts_at,
            status,
            booked_by: "H".to_string(),
            booked_at: Some(now),
            cancelled_by: String::new(),
            cancelled_at: None,
            completed_at: None,
            attended_not_screened: String::new(),
            assessment: false,
            created_at: now,
            updated_at: now,
        }
    }
}

pub struct MockNotifyResponses;

impl MockNotifyResponses {
    /// A 201 body acknowledging every message in the batch.
    pub fn batch_created(notify_batch_id: &str, messages: &[Message]) -> Value {
        let acknowledged: Vec<Value> = messages
            .iter()
            .map(|m| json!({
                "messageReference": m.id.to_string(),
                "id": format!("notify-{}", m.id.simple()),
            }))
            .collect();

        json!({
            "data": {
                "type": "MessageBatch",
                "id": notify_batch_id,
                "attributes": {
                    "messageBatchReference": Uuid::new_v4().to_string(),
                    "routingPlan": {
                        "id": Uuid::new_v4().to_string(),
                        "version": "1"
                    },
                    "messages": acknowledged
                }
            }
        })
    }

    pub fn error(status: u16, code: &str, title: &str) -> Value {
        json!({
            "errors": [{
                "id": Uuid::new_v4().to_string(),
                "code": code,
                "status": status.to_string(),
                "title": title,
                "detail": format!("{} ({})", title, code)
            }]
        })
    }
}

pub struct MockStatusEvents;

impl MockStatusEvents {
    pub fn message_status(message_id: Uuid, idempotency_key: &str, status: &str) -> String {
        json!({
            "data": [{
                "type": "MessageStatus",
                "attributes": {
                    "messageId": "2WL3qFTEFM0qMY8xjRbt1LIKCzM",
                    "messageReference": message_id.to_string(),
                    "messageStatus": status,
                    "messageStatusDescription": format!("Message {}", status),
                    "channels": [{ "type": "nhsapp", "channelStatus": "delivered" }],
                    "timestamp": "2025-07-21T10:15:30.123Z",
                    "routingPlan": { "id": Uuid::new_v4().to_string(), "version": "1" }
                },
                "links": { "message": "https://api.service.nhs.uk/comms/v1/messages/2WL3qFTEFM0qMY8xjRbt1LIKCzM" },
                "meta": { "idempotencyKey": idempotency_key }
            }]
        })
        .to_string()
    }

    pub fn channel_status(message_id: Uuid, idempotency_key: &str, supplier_status: &str) -> String {
        json!({
            "data": [{
                "type": "ChannelStatus",
                "attributes": {
                    "messageId": "2WL3qFTEFM0qMY8xjRbt1LIKCzM",
                    "messageReference": message_id.to_string(),
                    "cascadeType": "primary",
                    "cascadeOrder": 1,
                    "channel": "nhsapp",
                    "channelStatus": "delivered",
                    "channelStatusDescription": "Delivered to the NHS App",
                    "supplierStatus": supplier_status,
                    "timestamp": "2025-07-21T10:16:02Z",
                    "retryCount": 0
                },
                "links": { "message": "https://api.service.nhs.uk/comms/v1/messages/2WL3qFTEFM0qMY8xjRbt1LIKCzM" },
                "meta": { "idempotencyKey": idempotency_key }
            }]
        })
        .to_string()
    }
}
