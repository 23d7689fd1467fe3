// libs/appointment-cell/src/services/job.rs
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use shared_database::{AppointmentRepository, ClinicRepository};
use shared_models::Extract;

use crate::models::{AppointmentError, CreateAppointmentsSummary};
use crate::services::parser::ExtractParser;
use crate::services::reconciler::AppointmentReconciler;
use crate::services::storage::BlobStorage;

pub const DIR_NAME_DATE_FORMAT: &str = "%Y-%m-%d";

/// Reads the day's NBSS extracts from blob storage and reconciles every row
/// into clinics and appointments.
pub struct CreateAppointmentsJob {
    storage: Arc<dyn BlobStorage>,
    appointments: Arc<dyn AppointmentRepository>,
    parser: ExtractParser,
    reconciler: AppointmentReconciler,
}

impl CreateAppointmentsJob {
    pub fn new(
        storage: Arc<dyn BlobStorage>,
        clinics: Arc<dyn ClinicRepository>,
        appointments: Arc<dyn AppointmentRepository>,
        timezone: Tz,
    ) -> Self {
        Self {
            storage,
            parser: ExtractParser::new(timezone),
            reconciler: AppointmentReconciler::new(clinics, Arc::clone(&appointments)),
            appointments,
        }
    }

    #[instrument(skip(self), fields(date = %date))]
    pub async fn run(&self, date: NaiveDate, now: DateTime<Utc>) -> Result<CreateAppointmentsSummary, AppointmentError> {
        info!("Create Appointments command started");

        let prefix = date.format(DIR_NAME_DATE_FORMAT).to_string();
        let mut summary = CreateAppointmentsSummary::default();

        for name in self.storage.list_blobs(&prefix).await? {
            debug!("Processing blob {}", name);
            let content = self.storage.download(&name).await?;
            let parsed = self.parser.parse(&name, &content)?;

            for row in &parsed.rows {
                let (outcome, clinic_created) = self.reconciler.reconcile_row(row, now).await?;
                if clinic_created {
                    summary.clinics_created += 1;
                }
                summary.record(&outcome);
            }

            summary.files += 1;
            summary.rows += parsed.row_count();
            summary.rejected += parsed.rejected.len();

            self.appointments
                .record_extract(&Extract::new(&name, parsed.row_count(), now))
                .await?;
            info!("Processed {} rows from {}", parsed.row_count(), name);
        }

        info!(
            files = summary.files,
            created = summary.created,
            cancelled = summary.cancelled,
            completed = summary.completed,
            skipped = summary.skipped,
            rejected = summary.rejected,
            "Create Appointments command finished successfully"
        );
        Ok(summary)
    }
}
