// libs/appointment-cell/src/services/reconciler.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::{AppointmentRepository, ClinicRepository};
use shared_models::{Appointment, AppointmentStatus, Clinic};

use crate::models::{AppointmentError, ExtractRow, ReconcileOutcome, SkipReason};

/// Applies extract rows to the stored clinics and appointments.
///
/// Rows never fail for data reasons; anything that cannot be applied comes
/// back as `ReconcileOutcome::Skipped`. Repository failures propagate.
pub struct AppointmentReconciler {
    clinics: Arc<dyn ClinicRepository>,
    appointments: Arc<dyn AppointmentRepository>,
}

impl AppointmentReconciler {
    pub fn new(clinics: Arc<dyn ClinicRepository>, appointments: Arc<dyn AppointmentRepository>) -> Self {
        Self { clinics, appointments }
    }

    /// Upserts the row's clinic and reconciles its appointment. Returns the
    /// outcome and whether a new clinic was created.
    pub async fn reconcile_row(
        &self,
        row: &ExtractRow,
        now: DateTime<Utc>,
    ) -> Result<(ReconcileOutcome, bool), AppointmentError> {
        if row.is_holding_clinic() {
            debug!("Skipping holding clinic row {} ({})", row.line, row.clinic.code);
            return Ok((ReconcileOutcome::Skipped(SkipReason::HoldingClinic), false));
        }

        let (clinic, clinic_created) = self.clinics.upsert_clinic(row.clinic.clone(), now).await?;
        if clinic_created {
            info!("{} created", clinic);
        }

        let outcome = self.reconcile(row, &clinic, now).await?;
        Ok((outcome, clinic_created))
    }

    pub async fn reconcile(
        &self,
        row: &ExtractRow,
        clinic: &Clinic,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, AppointmentError> {
        let existing = self.appointments.find_appointment_by_nbss_id(&row.nbss_id).await?;

        let outcome = match (existing, row.status) {
            (None, AppointmentStatus::Booked) => {
                let appointment = new_appointment(row, clinic, now);
                self.appointments.insert_appointment(&appointment).await?;
                info!("{} created", appointment);
                ReconcileOutcome::Created(appointment)
            }
            (None, status) => ReconcileOutcome::Skipped(SkipReason::NoMatchingAppointment { status }),
            (Some(_), AppointmentStatus::Booked) => ReconcileOutcome::Skipped(SkipReason::AlreadyBooked),
            (Some(mut appointment), AppointmentStatus::Cancelled) => {
                if !appointment.status.can_transition_to(&AppointmentStatus::Cancelled) {
                    ReconcileOutcome::Skipped(SkipReason::AlreadyTerminal(appointment.status))
                } else {
                    appointment.status = AppointmentStatus::Cancelled;
                    appointment.cancelled_by = row.cancelled_by.clone();
                    appointment.cancelled_at = Some(row.action_at.unwrap_or(now));
                    appointment.updated_at = now;
                    self.appointments.update_appointment(&appointment).await?;
                    info!("{} cancelled", appointment);
                    ReconcileOutcome::Cancelled(appointment)
                }
            }
            (Some(mut appointment), status) => {
                if !appointment.status.can_transition_to(&status) {
                    ReconcileOutcome::Skipped(SkipReason::AlreadyTerminal(appointment.status))
                } else if appointment.starts_at >= now {
                    ReconcileOutcome::Skipped(SkipReason::NotYetStarted)
                } else {
                    appointment.status = status;
                    appointment.attended_not_screened = row.attended_not_screened.clone();
                    appointment.completed_at = Some(row.action_at.unwrap_or(now));
                    appointment.updated_at = now;
                    self.appointments.update_appointment(&appointment).await?;
                    info!("{} marked completed ({})", appointment, status.code());
                    ReconcileOutcome::Completed(appointment)
                }
            }
        };

        if let ReconcileOutcome::Skipped(reason) = &outcome {
            info!("Skipping row {} for NBSS ID {}: {}", row.line, row.nbss_id, reason);
        }
        Ok(outcome)
    }
}

fn new_appointment(row: &ExtractRow, clinic: &Clinic, now: DateTime<Utc>) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        nbss_id: row.nbss_id.clone(),
        nhs_number: row.nhs_number,
        number: row.number.clone(),
        batch_id: row.batch_id.clone(),
        clinic_id: clinic.id,
        episode_started_at: row.episode_started_at,
        episode_type: row.episode_type.clone(),
        starts_at: row.starts_at,
        status: AppointmentStatus::Booked,
        booked_by: row.booked_by.clone(),
        booked_at: row.action_at,
        cancelled_by: String::new(),
        cancelled_at: None,
        completed_at: None,
        attended_not_screened: String::new(),
        assessment: row.assessment,
        created_at: now,
        updated_at: now,
    }
}
