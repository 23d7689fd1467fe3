// libs/shared/models/src/appointment.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CLINICS
// ==============================================================================

/// A clinic where an appointment is held. Keyed on (`bso_code`, `code`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clinic {
    pub id: Uuid,
    pub code: String,
    pub bso_code: String,
    pub name: String,
    pub alt_name: String,
    pub holding_clinic: bool,
    pub location_code: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub address_line_3: String,
    pub address_line_4: String,
    pub address_line_5: String,
    pub postcode: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Clinic attributes as read from an extract row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClinicDetails {
    pub code: String,
    pub bso_code: String,
    pub name: String,
    pub alt_name: String,
    pub holding_clinic: bool,
    pub location_code: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub address_line_3: String,
    pub address_line_4: String,
    pub address_line_5: String,
    pub postcode: String,
}

impl Clinic {
    pub fn new(details: ClinicDetails, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: details.code,
            bso_code: details.bso_code,
            name: details.name,
            alt_name: details.alt_name,
            holding_clinic: details.holding_clinic,
            location_code: details.location_code,
            address_line_1: details.address_line_1,
            address_line_2: details.address_line_2,
            address_line_3: details.address_line_3,
            address_line_4: details.address_line_4,
            address_line_5: details.address_line_5,
            postcode: details.postcode,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn details(&self) -> ClinicDetails {
        ClinicDetails {
            code: self.code.clone(),
            bso_code: self.bso_code.clone(),
            name: self.name.clone(),
            alt_name: self.alt_name.clone(),
            holding_clinic: self.holding_clinic,
            location_code: self.location_code.clone(),
            address_line_1: self.address_line_1.clone(),
            address_line_2: self.address_line_2.clone(),
            address_line_3: self.address_line_3.clone(),
            address_line_4: self.address_line_4.clone(),
            address_line_5: self.address_line_5.clone(),
            postcode: self.postcode.clone(),
        }
    }

    /// Overwrites every extract-sourced field. Returns true if anything changed.
    pub fn apply_details(&mut self, details: ClinicDetails, now: DateTime<Utc>) -> bool {
        if self.details() == details {
            return false;
        }

        let id = self.id;
        let created_at = self.created_at;
        *self = Clinic::new(details, now);
        self.id = id;
        self.created_at = created_at;
        true
    }

    /// Address lines joined for display, skipping blanks.
    pub fn address(&self) -> String {
        [
            &self.address_line_1,
            &self.address_line_2,
            &self.address_line_3,
            &self.address_line_4,
            &self.address_line_5,
            &self.postcode,
        ]
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.trim())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

impl fmt::Display for Clinic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Clinic {} ({})", self.name, self.code)
    }
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentStatus {
    #[serde(rename = "B")]
    Booked,
    #[serde(rename = "C")]
    Cancelled,
    #[serde(rename = "A")]
    Attended,
    #[serde(rename = "D")]
    DidNotAttend,
}

impl AppointmentStatus {
    /// Parses an NBSS status code (`B`, `C`, `A`, `D`).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "B" => Some(AppointmentStatus::Booked),
            "C" => Some(AppointmentStatus::Cancelled),
            "A" => Some(AppointmentStatus::Attended),
            "D" => Some(AppointmentStatus::DidNotAttend),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "B",
            AppointmentStatus::Cancelled => "C",
            AppointmentStatus::Attended => "A",
            AppointmentStatus::DidNotAttend => "D",
        }
    }

    pub fn valid_transitions(&self) -> Vec<AppointmentStatus> {
        match self {
            AppointmentStatus::Booked => vec![
                AppointmentStatus::Cancelled,
                AppointmentStatus::Attended,
                AppointmentStatus::DidNotAttend,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Cancelled
            | AppointmentStatus::Attended
            | AppointmentStatus::DidNotAttend => vec![],
        }
    }

    pub fn can_transition_to(&self, target: &AppointmentStatus) -> bool {
        self.valid_transitions().contains(target)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Booked => write!(f, "booked"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Attended => write!(f, "attended"),
            AppointmentStatus::DidNotAttend => write!(f, "did_not_attend"),
        }
    }
}

/// The screening appointment a message is built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub nbss_id: String,
    pub nhs_number: i64,
    pub number: String,
    pub batch_id: String,
    pub clinic_id: Uuid,
    pub episode_started_at: Option<DateTime<Utc>>,
    pub episode_type: String,
    pub starts_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub booked_by: String,
    pub booked_at: Option<DateTime<Utc>>,
    pub cancelled_by: String,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attended_not_screened: String,
    pub assessment: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Appointment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Appointment {} for {}", self.nbss_id, self.starts_at.to_rfc3339())
    }
}

/// One processed extract file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Extract {
    pub id: Uuid,
    pub filename: String,
    pub sequence_number: Option<i64>,
    pub row_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Extract {
    pub fn new(filename: &str, row_count: usize, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            sequence_number: sequence_number_from_filename(filename),
            row_count: row_count as i64,
            created_at: now,
        }
    }
}

/// Extract files are named like `ABC_20241202091221_APPT_106.dat`; the trailing
/// number is the NBSS sequence number.
pub fn sequence_number_from_filename(filename: &str) -> Option<i64> {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let stem = base.split('.').next().unwrap_or(base);
    stem.rsplit('_').next().and_then(|n| n.parse().ok())
}
