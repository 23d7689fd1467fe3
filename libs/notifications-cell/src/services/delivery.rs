// libs/notifications-cell/src/services/delivery.rs
use chrono_tz::Tz;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, StatusCode,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;
use shared_models::{Appointment, Clinic, Message, MessageBatch};

use crate::models::{DeliveryOutcome, NotifyBatchResponse};

pub const MESSAGE_BATCHES_PATH: &str = "/api/v1/message-batches";

/// A message together with what its personalisation is built from.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub message: Message,
    pub appointment: Appointment,
    pub clinic: Clinic,
}

/// Client for the communications API's message batch endpoint.
pub struct NotifyApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    timezone: Tz,
}

impl NotifyApiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.notify_api_base_url.trim_end_matches('/').to_string(),
            api_key: config.notify_api_key.clone(),
            timezone: config.timezone,
        }
    }

    fn get_headers(&self, batch: &MessageBatch) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/vnd.api+json"));

        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, bearer);
        }
        if let Ok(correlation_id) = HeaderValue::from_str(&batch.id.to_string()) {
            headers.insert("X-Correlation-Id", correlation_id);
        }

        headers
    }

    pub fn batch_payload(&self, batch: &MessageBatch, messages: &[OutboundMessage]) -> Value {
        let messages: Vec<Value> = messages.iter().map(|m| self.message_payload(m)).collect();

        json!({
            "data": {
                "type": "MessageBatch",
                "attributes": {
                    "routingPlanId": batch.routing_plan_id,
                    "messageBatchReference": batch.id,
                    "messages": messages
                }
            }
        })
    }

    fn message_payload(&self, outbound: &OutboundMessage) -> Value {
        let starts_at = outbound.appointment.starts_at.with_timezone(&self.timezone);

        json!({
            "messageReference": outbound.message.id,
            "recipient": {
                "nhsNumber": outbound.appointment.nhs_number.to_string()
            },
            "personalisation": {
                "appointment_date": starts_at.format("%A %-d %B %Y").to_string(),
                "appointment_time": starts_at.format("%-I:%M%P").to_string(),
                "appointment_clinic_name": outbound.clinic.name,
                "appointment_location": outbound.clinic.address()
            }
        })
    }

    /// Sends the batch. Never fails: transport errors come back as a failed
    /// outcome without a status.
    pub async fn send_message_batch(&self, batch: &MessageBatch, messages: &[OutboundMessage]) -> DeliveryOutcome {
        let url = format!("{}{}", self.base_url, MESSAGE_BATCHES_PATH);
        debug!("Sending {} with {} messages to {}", batch, messages.len(), url);

        let response = self
            .client
            .post(&url)
            .headers(self.get_headers(batch))
            .json(&self.batch_payload(batch, messages))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                error!("Request for {} failed: {}", batch, e);
                return DeliveryOutcome::Failed {
                    status: None,
                    body: json!({ "error": e.to_string() }),
                };
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            Err(e) => {
                error!("Failed to read response body for {}: {}", batch, e);
                json!({ "error": format!("Failed to read response body: {}", e) })
            }
        };

        if status != StatusCode::CREATED {
            error!("Failed to send {}. Status: {}", batch, status);
            return DeliveryOutcome::Failed {
                status: Some(status.as_u16()),
                body,
            };
        }

        // The batch was accepted whatever the body says.
        match serde_json::from_value::<NotifyBatchResponse>(body.clone()) {
            Ok(response) => {
                info!("{} accepted as {}", batch, response.data.id);
                DeliveryOutcome::Sent {
                    response,
                    unexpected_body: None,
                }
            }
            Err(e) => {
                warn!("{} accepted with an unexpected response body: {}", batch, e);
                DeliveryOutcome::Sent {
                    response: NotifyBatchResponse::default(),
                    unexpected_body: Some(body),
                }
            }
        }
    }
}
