// libs/shared/database/src/memory.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_models::{
    AppError, Appointment, AppointmentStatus, ChannelStatus, Clinic, ClinicDetails, Extract,
    Message, MessageBatch, MessageBatchStatus, MessageStatus,
};

use crate::repository::{
    AppointmentRepository, ClinicRepository, MessageBatchRepository, StatusRepository,
};

#[derive(Default)]
struct Tables {
    clinics: Vec<Clinic>,
    appointments: Vec<Appointment>,
    extracts: Vec<Extract>,
    batches: HashMap<Uuid, MessageBatch>,
    messages: Vec<Message>,
    channel_statuses: Vec<ChannelStatus>,
    message_statuses: Vec<MessageStatus>,
}

impl Tables {
    fn has_status_records(&self, message_id: Uuid) -> bool {
        self.channel_statuses.iter().any(|s| s.message_id == message_id)
            || self.message_statuses.iter().any(|s| s.message_id == message_id)
    }
}

/// Process-local store with the same constraints as the database schema:
/// unique natural keys, protected references and cascading batch deletes.
/// All tables sit behind one lock so multi-row writes are atomic.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn clinics(&self) -> Vec<Clinic> {
        self.tables.read().await.clinics.clone()
    }

    pub async fn appointments(&self) -> Vec<Appointment> {
        self.tables.read().await.appointments.clone()
    }

    pub async fn extracts(&self) -> Vec<Extract> {
        self.tables.read().await.extracts.clone()
    }

    pub async fn batches(&self) -> Vec<MessageBatch> {
        let mut batches: Vec<_> = self.tables.read().await.batches.values().cloned().collect();
        batches.sort_by_key(|b| b.created_at);
        batches
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.tables.read().await.messages.clone()
    }

    pub async fn channel_statuses(&self) -> Vec<ChannelStatus> {
        self.tables.read().await.channel_statuses.clone()
    }

    pub async fn message_statuses(&self) -> Vec<MessageStatus> {
        self.tables.read().await.message_statuses.clone()
    }
}

#[async_trait]
impl ClinicRepository for InMemoryStore {
    async fn upsert_clinic(&self, details: ClinicDetails, now: DateTime<Utc>) -> Result<(Clinic, bool), AppError> {
        let mut tables = self.tables.write().await;

        if let Some(clinic) = tables
            .clinics
            .iter_mut()
            .find(|c| c.bso_code == details.bso_code && c.code == details.code)
        {
            clinic.apply_details(details, now);
            return Ok((clinic.clone(), false));
        }

        let clinic = Clinic::new(details, now);
        tables.clinics.push(clinic.clone());
        Ok((clinic, true))
    }

    async fn get_clinics(&self, ids: &[Uuid]) -> Result<Vec<Clinic>, AppError> {
        Ok(self.tables.read().await.clinics.iter().filter(|c| ids.contains(&c.id)).cloned().collect())
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryStore {
    async fn find_appointment_by_nbss_id(&self, nbss_id: &str) -> Result<Option<Appointment>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .appointments
            .iter()
            .find(|a| a.nbss_id == nbss_id)
            .cloned())
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppError> {
        Ok(self.tables.read().await.appointments.iter().find(|a| a.id == id).cloned())
    }

    async fn get_appointments(&self, ids: &[Uuid]) -> Result<Vec<Appointment>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .appointments
            .iter()
            .filter(|a| ids.contains(&a.id))
            .cloned()
            .collect())
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;

        if tables.appointments.iter().any(|a| a.nbss_id == appointment.nbss_id) {
            return Err(AppError::Conflict(format!(
                "Appointment with nbss_id {} already exists",
                appointment.nbss_id
            )));
        }
        if !tables.clinics.iter().any(|c| c.id == appointment.clinic_id) {
            return Err(AppError::Conflict(format!("Clinic {} does not exist", appointment.clinic_id)));
        }

        tables.appointments.push(appointment.clone());
        Ok(())
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .appointments
            .iter_mut()
            .find(|a| a.id == appointment.id)
            .ok_or_else(|| AppError::NotFound(format!("Appointment {}", appointment.id)))?;
        *existing = appointment.clone();
        Ok(())
    }

    async fn appointments_due_for_messaging(&self, cutoff: DateTime<Utc>) -> Result<Vec<Appointment>, AppError> {
        let tables = self.tables.read().await;
        let mut due: Vec<Appointment> = tables
            .appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Booked)
            .filter(|a| a.starts_at <= cutoff)
            .filter(|a| !tables.messages.iter().any(|m| m.appointment_id == a.id))
            .cloned()
            .collect();
        due.sort_by_key(|a| a.starts_at);
        Ok(due)
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.messages.iter().any(|m| m.appointment_id == id) {
            return Err(AppError::Conflict(format!("Appointment {} is referenced by messages", id)));
        }
        tables.appointments.retain(|a| a.id != id);
        Ok(())
    }

    async fn record_extract(&self, extract: &Extract) -> Result<(), AppError> {
        self.tables.write().await.extracts.push(extract.clone());
        Ok(())
    }
}

#[async_trait]
impl MessageBatchRepository for InMemoryStore {
    async fn create_batch_with_messages(&self, batch: &MessageBatch, messages: &[Message]) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;

        if tables.batches.contains_key(&batch.id) {
            return Err(AppError::Conflict(format!("{} already exists", batch)));
        }
        // Check everything before writing anything.
        for message in messages {
            if !tables.appointments.iter().any(|a| a.id == message.appointment_id) {
                return Err(AppError::Conflict(format!(
                    "Appointment {} does not exist",
                    message.appointment_id
                )));
            }
            let has_open_message = tables
                .messages
                .iter()
                .any(|m| m.appointment_id == message.appointment_id && m.status.is_open());
            if has_open_message {
                return Err(AppError::Conflict(format!(
                    "Appointment {} already has an open message",
                    message.appointment_id
                )));
            }
        }

        tables.batches.insert(batch.id, batch.clone());
        tables.messages.extend(messages.iter().cloned());
        Ok(())
    }

    async fn find_batch(&self, id: Uuid, status: Option<MessageBatchStatus>) -> Result<Option<MessageBatch>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .batches
            .get(&id)
            .filter(|b| status.map_or(true, |s| b.status == s))
            .cloned())
    }

    async fn update_batch(&self, batch: &MessageBatch) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .batches
            .get_mut(&batch.id)
            .ok_or_else(|| AppError::NotFound(format!("MessageBatch {}", batch.id)))?;
        *existing = batch.clone();
        Ok(())
    }

    async fn messages_for_batch(&self, batch_id: Uuid) -> Result<Vec<Message>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.batch_id == Some(batch_id))
            .cloned()
            .collect())
    }

    async fn find_message(&self, id: Uuid) -> Result<Option<Message>, AppError> {
        Ok(self.tables.read().await.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn update_message(&self, message: &Message) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .messages
            .iter_mut()
            .find(|m| m.id == message.id)
            .ok_or_else(|| AppError::NotFound(format!("Message {}", message.id)))?;
        *existing = message.clone();
        Ok(())
    }

    async fn delete_batch(&self, id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;

        let protected = tables
            .messages
            .iter()
            .filter(|m| m.batch_id == Some(id))
            .any(|m| tables.has_status_records(m.id));
        if protected {
            return Err(AppError::Conflict(format!(
                "MessageBatch {} has messages referenced by status records",
                id
            )));
        }

        tables.batches.remove(&id);
        tables.messages.retain(|m| m.batch_id != Some(id));
        Ok(())
    }
}

#[async_trait]
impl StatusRepository for InMemoryStore {
    async fn channel_status_exists(&self, idempotency_key: &str) -> Result<bool, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .channel_statuses
            .iter()
            .any(|s| s.idempotency_key == idempotency_key))
    }

    async fn insert_channel_status(&self, status: &ChannelStatus) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.channel_statuses.iter().any(|s| s.idempotency_key == status.idempotency_key) {
            return Err(AppError::Conflict(format!(
                "ChannelStatus with idempotency key {} already exists",
                status.idempotency_key
            )));
        }
        if !tables.messages.iter().any(|m| m.id == status.message_id) {
            return Err(AppError::Conflict(format!("Message {} does not exist", status.message_id)));
        }
        tables.channel_statuses.push(status.clone());
        Ok(())
    }

    async fn message_status_exists(&self, idempotency_key: &str) -> Result<bool, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .message_statuses
            .iter()
            .any(|s| s.idempotency_key == idempotency_key))
    }

    async fn insert_message_status(&self, status: &MessageStatus) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.message_statuses.iter().any(|s| s.idempotency_key == status.idempotency_key) {
            return Err(AppError::Conflict(format!(
                "MessageStatus with idempotency key {} already exists",
                status.idempotency_key
            )));
        }
        if !tables.messages.iter().any(|m| m.id == status.message_id) {
            return Err(AppError::Conflict(format!("Message {} does not exist", status.message_id)));
        }
        tables.message_statuses.push(status.clone());
        Ok(())
    }
}
