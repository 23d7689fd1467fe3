// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use shared_models::{AppError, Appointment, AppointmentStatus, ClinicDetails};

// ==============================================================================
// EXTRACT ROWS
// ==============================================================================

/// One data row of an NBSS appointment extract, with typed values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractRow {
    /// 1-based line number in the extract file.
    pub line: usize,
    pub clinic: ClinicDetails,
    pub nbss_id: String,
    pub nhs_number: i64,
    pub number: String,
    pub batch_id: String,
    pub episode_started_at: Option<DateTime<Utc>>,
    pub episode_type: String,
    pub starts_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub booked_by: String,
    pub cancelled_by: String,
    pub action_at: Option<DateTime<Utc>>,
    pub assessment: bool,
    pub attended_not_screened: String,
}

impl ExtractRow {
    pub fn is_holding_clinic(&self) -> bool {
        self.clinic.holding_clinic
    }
}

/// A row that could not be read, kept for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedExtract {
    pub rows: Vec<ExtractRow>,
    pub rejected: Vec<RejectedRow>,
}

impl ParsedExtract {
    pub fn row_count(&self) -> usize {
        self.rows.len() + self.rejected.len()
    }
}

// ==============================================================================
// RECONCILIATION
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Created(Appointment),
    Cancelled(Appointment),
    Completed(Appointment),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    HoldingClinic,
    NoMatchingAppointment { status: AppointmentStatus },
    AlreadyBooked,
    AlreadyTerminal(AppointmentStatus),
    NotYetStarted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::HoldingClinic => write!(f, "holding clinic"),
            SkipReason::NoMatchingAppointment { status } => {
                write!(f, "no appointment record found for status {}", status)
            }
            SkipReason::AlreadyBooked => write!(f, "appointment already exists"),
            SkipReason::AlreadyTerminal(status) => write!(f, "appointment is already {}", status),
            SkipReason::NotYetStarted => write!(f, "appointment has not started yet"),
        }
    }
}

/// Totals for one create-appointments run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateAppointmentsSummary {
    pub files: usize,
    pub rows: usize,
    pub clinics_created: usize,
    pub created: usize,
    pub cancelled: usize,
    pub completed: usize,
    pub skipped: usize,
    pub rejected: usize,
}

impl CreateAppointmentsSummary {
    pub fn record(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Created(_) => self.created += 1,
            ReconcileOutcome::Cancelled(_) => self.cancelled += 1,
            ReconcileOutcome::Completed(_) => self.completed += 1,
            ReconcileOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Extract {filename} is malformed: {reason}")]
    MalformedExtract { filename: String, reason: String },

    #[error("Invalid value for {column}: {reason}")]
    InvalidField { column: String, reason: String },

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Blob storage error: {0}")]
    StorageError(String),

    #[error("Blob storage is not configured: {0}")]
    StorageNotConfigured(String),

    #[error(transparent)]
    Repository(#[from] AppError),
}
