//! Repository seams over the relational store.
//!
//! Each job builds its repositories at start-up and passes them down by
//! reference; nothing holds a global connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared_models::{
    AppError, Appointment, ChannelStatus, Clinic, ClinicDetails, Extract, Message, MessageBatch,
    MessageBatchStatus, MessageStatus,
};

#[async_trait]
pub trait ClinicRepository: Send + Sync {
    /// Get-or-create on (`bso_code`, `code`), overwriting changed fields of an
    /// existing clinic. The flag is true when the clinic was created.
    async fn upsert_clinic(&self, details: ClinicDetails, now: DateTime<Utc>) -> Result<(Clinic, bool), AppError>;

    /// Clinics with any of the given ids, in no particular order. Unknown ids
    /// are left out.
    async fn get_clinics(&self, ids: &[Uuid]) -> Result<Vec<Clinic>, AppError>;
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn find_appointment_by_nbss_id(&self, nbss_id: &str) -> Result<Option<Appointment>, AppError>;

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppError>;

    /// Appointments with any of the given ids, in no particular order.
    async fn get_appointments(&self, ids: &[Uuid]) -> Result<Vec<Appointment>, AppError>;

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), AppError>;

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), AppError>;

    /// Booked appointments starting at or before `cutoff` that have no message yet,
    /// ordered by start time.
    async fn appointments_due_for_messaging(&self, cutoff: DateTime<Utc>) -> Result<Vec<Appointment>, AppError>;

    /// Fails with `AppError::Conflict` while messages reference the appointment.
    async fn delete_appointment(&self, id: Uuid) -> Result<(), AppError>;

    async fn record_extract(&self, extract: &Extract) -> Result<(), AppError>;
}

#[async_trait]
pub trait MessageBatchRepository: Send + Sync {
    /// Stores the batch and all of its messages as one unit.
    async fn create_batch_with_messages(&self, batch: &MessageBatch, messages: &[Message]) -> Result<(), AppError>;

    /// Looks a batch up by id, optionally requiring a status.
    async fn find_batch(&self, id: Uuid, status: Option<MessageBatchStatus>) -> Result<Option<MessageBatch>, AppError>;

    async fn update_batch(&self, batch: &MessageBatch) -> Result<(), AppError>;

    async fn messages_for_batch(&self, batch_id: Uuid) -> Result<Vec<Message>, AppError>;

    async fn find_message(&self, id: Uuid) -> Result<Option<Message>, AppError>;

    async fn update_message(&self, message: &Message) -> Result<(), AppError>;

    /// Deletes the batch and its messages. Fails with `AppError::Conflict` while
    /// status records reference any of the messages.
    async fn delete_batch(&self, id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait StatusRepository: Send + Sync {
    async fn channel_status_exists(&self, idempotency_key: &str) -> Result<bool, AppError>;

    /// Fails with `AppError::Conflict` if the idempotency key is already stored.
    async fn insert_channel_status(&self, status: &ChannelStatus) -> Result<(), AppError>;

    async fn message_status_exists(&self, idempotency_key: &str) -> Result<bool, AppError>;

    /// Fails with `AppError::Conflict` if the idempotency key is already stored.
    async fn insert_message_status(&self, status: &MessageStatus) -> Result<(), AppError>;
}
