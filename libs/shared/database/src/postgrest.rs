// libs/shared/database/src/postgrest.rs
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{
    AppError, Appointment, AppointmentStatus, ChannelStatus, Clinic, ClinicDetails, Extract,
    Message, MessageBatch, MessageBatchStatus, MessageStatus,
};

use crate::repository::{
    AppointmentRepository, ClinicRepository, MessageBatchRepository, StatusRepository,
};
use crate::supabase::{return_representation, SupabaseClient};

/// Repositories backed by the Supabase PostgREST API.
pub struct SupabaseRepository {
    supabase: SupabaseClient,
}

impl SupabaseRepository {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn first<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, AppError> {
        let mut rows: Vec<T> = self.supabase.request(Method::GET, path, None).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows.swap_remove(0)))
    }

    async fn insert<T: serde::Serialize>(&self, table: &str, row: &T) -> Result<(), AppError> {
        let path = format!("/rest/v1/{}", table);
        let _: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            &path,
            Some(serde_json::to_value(row)?),
            Some(return_representation()),
        ).await?;
        Ok(())
    }

    /// PATCHes one row. PostgREST answers an update that matched nothing with
    /// an empty set, which is reported as `NotFound`.
    async fn update_by_id<T: serde::Serialize>(&self, table: &str, id: Uuid, row: &T) -> Result<(), AppError> {
        let path = format!("/rest/v1/{}?id=eq.{}", table, id);
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(serde_json::to_value(row)?),
            Some(return_representation()),
        ).await?;
        if rows.is_empty() {
            return Err(AppError::NotFound(format!("No {} row with id {}", table, id)));
        }
        Ok(())
    }

    /// Rows whose id is in `ids`, fetched in one request.
    async fn by_ids<T: DeserializeOwned>(&self, table: &str, ids: &[Uuid]) -> Result<Vec<T>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let list: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        let path = format!("/rest/v1/{}?id=in.({})", table, list.join(","));
        self.supabase.request(Method::GET, &path, None).await
    }

    async fn exists(&self, table: &str, column: &str, value: &str) -> Result<bool, AppError> {
        let path = format!(
            "/rest/v1/{}?select=id&{}=eq.{}&limit=1",
            table,
            column,
            urlencoding::encode(value)
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(!rows.is_empty())
    }
}

fn timestamp_param(value: DateTime<Utc>) -> String {
    urlencoding::encode(&value.to_rfc3339_opts(SecondsFormat::Micros, true)).into_owned()
}

#[async_trait]
impl ClinicRepository for SupabaseRepository {
    async fn upsert_clinic(&self, details: ClinicDetails, now: DateTime<Utc>) -> Result<(Clinic, bool), AppError> {
        let path = format!(
            "/rest/v1/clinics?bso_code=eq.{}&code=eq.{}&limit=1",
            urlencoding::encode(&details.bso_code),
            urlencoding::encode(&details.code)
        );

        if let Some(mut clinic) = self.first::<Clinic>(&path).await? {
            if clinic.apply_details(details, now) {
                debug!("Updating changed fields on {}", clinic);
                self.update_by_id("clinics", clinic.id, &clinic).await?;
            }
            return Ok((clinic, false));
        }

        let clinic = Clinic::new(details, now);
        self.insert("clinics", &clinic).await?;
        Ok((clinic, true))
    }

    async fn get_clinics(&self, ids: &[Uuid]) -> Result<Vec<Clinic>, AppError> {
        self.by_ids("clinics", ids).await
    }
}

#[async_trait]
impl AppointmentRepository for SupabaseRepository {
    async fn find_appointment_by_nbss_id(&self, nbss_id: &str) -> Result<Option<Appointment>, AppError> {
        let path = format!(
            "/rest/v1/appointments?nbss_id=eq.{}&limit=1",
            urlencoding::encode(nbss_id)
        );
        self.first(&path).await
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppError> {
        self.first(&format!("/rest/v1/appointments?id=eq.{}&limit=1", id)).await
    }

    async fn get_appointments(&self, ids: &[Uuid]) -> Result<Vec<Appointment>, AppError> {
        self.by_ids("appointments", ids).await
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), AppError> {
        self.insert("appointments", appointment).await
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), AppError> {
        self.update_by_id("appointments", appointment.id, appointment).await
    }

    async fn appointments_due_for_messaging(&self, cutoff: DateTime<Utc>) -> Result<Vec<Appointment>, AppError> {
        // Left-joined messages filtered to null is PostgREST's anti-join.
        let path = format!(
            "/rest/v1/appointments?select=*,messages(id)&messages=is.null&status=eq.{}&starts_at=lte.{}&order=starts_at.asc",
            AppointmentStatus::Booked.code(),
            timestamp_param(cutoff)
        );
        self.supabase.request(Method::GET, &path, None).await
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), AppError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        self.supabase.execute(Method::DELETE, &path, None).await
    }

    async fn record_extract(&self, extract: &Extract) -> Result<(), AppError> {
        self.insert("extracts", extract).await
    }
}

#[async_trait]
impl MessageBatchRepository for SupabaseRepository {
    async fn create_batch_with_messages(&self, batch: &MessageBatch, messages: &[Message]) -> Result<(), AppError> {
        // One database function call, one transaction.
        let body = json!({
            "batch": batch,
            "messages": messages,
        });
        self.supabase.execute(Method::POST, "/rest/v1/rpc/create_message_batch", Some(body)).await?;
        info!("Stored {} with {} messages", batch, messages.len());
        Ok(())
    }

    async fn find_batch(&self, id: Uuid, status: Option<MessageBatchStatus>) -> Result<Option<MessageBatch>, AppError> {
        let mut path = format!("/rest/v1/message_batches?id=eq.{}", id);
        if let Some(status) = status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        path.push_str("&limit=1");
        self.first(&path).await
    }

    async fn update_batch(&self, batch: &MessageBatch) -> Result<(), AppError> {
        self.update_by_id("message_batches", batch.id, batch).await
    }

    async fn messages_for_batch(&self, batch_id: Uuid) -> Result<Vec<Message>, AppError> {
        let path = format!("/rest/v1/messages?batch_id=eq.{}&order=created_at.asc", batch_id);
        self.supabase.request(Method::GET, &path, None).await
    }

    async fn find_message(&self, id: Uuid) -> Result<Option<Message>, AppError> {
        self.first(&format!("/rest/v1/messages?id=eq.{}&limit=1", id)).await
    }

    async fn update_message(&self, message: &Message) -> Result<(), AppError> {
        self.update_by_id("messages", message.id, message).await
    }

    async fn delete_batch(&self, id: Uuid) -> Result<(), AppError> {
        let path = format!("/rest/v1/message_batches?id=eq.{}", id);
        self.supabase.execute(Method::DELETE, &path, None).await
    }
}

#[async_trait]
impl StatusRepository for SupabaseRepository {
    async fn channel_status_exists(&self, idempotency_key: &str) -> Result<bool, AppError> {
        self.exists("channel_statuses", "idempotency_key", idempotency_key).await
    }

    async fn insert_channel_status(&self, status: &ChannelStatus) -> Result<(), AppError> {
        self.insert("channel_statuses", status).await
    }

    async fn message_status_exists(&self, idempotency_key: &str) -> Result<bool, AppError> {
        self.exists("message_statuses", "idempotency_key", idempotency_key).await
    }

    async fn insert_message_status(&self, status: &MessageStatus) -> Result<(), AppError> {
        self.insert("message_statuses", status).await
    }
}
