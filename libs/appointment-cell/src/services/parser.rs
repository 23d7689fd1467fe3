// libs/appointment-cell/src/services/parser.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use tracing::{debug, warn};

use shared_models::{AppointmentStatus, ClinicDetails};

use crate::models::{AppointmentError, ExtractRow, ParsedExtract, RejectedRow};

const DELIMITER: u8 = b'|';

const APPT_DATE_TIME_FORMAT: &str = "%Y%m%d %H%M";
const ACTION_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const EPISODE_START_FORMAT: &str = "%Y%m%d";

/// Reads NBSS appointment extracts: a preamble line, a pipe-delimited header
/// line, the data rows and a single footer line.
pub struct ExtractParser {
    timezone: Tz,
}

impl ExtractParser {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn parse(&self, filename: &str, content: &str) -> Result<ParsedExtract, AppointmentError> {
        let lines: Vec<&str> = content.lines().collect();

        let footer = lines
            .iter()
            .rposition(|l| !l.trim().is_empty())
            .ok_or_else(|| malformed(filename, "file is empty"))?;
        if footer < 2 {
            return Err(malformed(filename, "expected a preamble, a header and a footer"));
        }

        let body = lines[1..footer].join("\n");
        let mut reader = ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(body.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| malformed(filename, &format!("unreadable header: {}", e)))?
            .clone();
        let columns = Columns::new(&headers);

        let mut parsed = ParsedExtract::default();
        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    let line = e.position().map(|p| p.line() as usize + 1).unwrap_or_default();
                    warn!("Unreadable row at line {} of {}: {}", line, filename, e);
                    parsed.rejected.push(RejectedRow { line, reason: e.to_string() });
                    continue;
                }
            };
            // The preamble line was dropped before reading.
            let line = record.position().map(|p| p.line() as usize + 1).unwrap_or_default();

            match self.parse_row(&columns, &record, line) {
                Ok(row) => parsed.rows.push(row),
                Err(e) => {
                    warn!("Rejected row at line {} of {}: {}", line, filename, e);
                    parsed.rejected.push(RejectedRow { line, reason: e.to_string() });
                }
            }
        }

        debug!("Parsed {} rows ({} rejected) from {}", parsed.rows.len(), parsed.rejected.len(), filename);
        Ok(parsed)
    }

    fn parse_row(&self, columns: &Columns, record: &StringRecord, line: usize) -> Result<ExtractRow, AppointmentError> {
        let row = Row { columns, record };

        let clinic = ClinicDetails {
            code: row.required(&["Clinic Code"])?.to_string(),
            bso_code: row.required(&["BSO"])?.to_string(),
            name: row.text(&["Clinic Name"]),
            alt_name: row.text(&["Clinic Name (Let)"]),
            holding_clinic: row.text(&["Holding Clinic"]) == "Y",
            location_code: row.text(&["Location"]),
            address_line_1: row.text(&["Clinic Address 1"]),
            address_line_2: row.text(&["Clinic Address 2"]),
            address_line_3: row.text(&["Clinic Address 3"]),
            address_line_4: row.text(&["Clinic Address 4"]),
            address_line_5: row.text(&["Clinic Address 5"]),
            postcode: row.text(&["Postcode"]),
        };

        let nhs_number = row.required(&["NHS Num"])?;
        let nhs_number = nhs_number.parse::<i64>().map_err(|_| invalid("NHS Num", nhs_number))?;

        let status = row.required(&["Status"])?;
        let status = AppointmentStatus::from_code(status).ok_or_else(|| invalid("Status", status))?;

        let appt_date = row.required(&["Appt Date"])?;
        let appt_time = row.required(&["Appt Time"])?;
        let starts_at = NaiveDateTime::parse_from_str(
            &format!("{} {}", appt_date, appt_time),
            APPT_DATE_TIME_FORMAT,
        )
        .map_err(|_| invalid("Appt Date/Appt Time", &format!("{} {}", appt_date, appt_time)))?;

        let episode_started_at = match row.text(&["Episode Start"]).as_str() {
            "" => None,
            value => {
                let date = NaiveDate::parse_from_str(value, EPISODE_START_FORMAT)
                    .map_err(|_| invalid("Episode Start", value))?;
                let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| invalid("Episode Start", value))?;
                Some(self.to_utc("Episode Start", midnight)?)
            }
        };

        let action_at = match row.text(&["Action Timestamp"]).as_str() {
            "" => None,
            value => {
                let naive = NaiveDateTime::parse_from_str(value, ACTION_TIMESTAMP_FORMAT)
                    .map_err(|_| invalid("Action Timestamp", value))?;
                Some(self.to_utc("Action Timestamp", naive)?)
            }
        };

        Ok(ExtractRow {
            line,
            clinic,
            nbss_id: row.required(&["Appointment ID"])?.to_string(),
            nhs_number,
            number: row.text(&["Screen Appt num"]),
            batch_id: row.text(&["Batch ID", "BatchID"]),
            episode_started_at,
            episode_type: row.text(&["Episode Type", "Epsiode Type"]),
            starts_at: self.to_utc("Appt Date/Appt Time", starts_at)?,
            status,
            booked_by: row.text(&["Booked By"]),
            cancelled_by: row.text(&["Cancelled By"]),
            action_at,
            assessment: row.text(&["Screen or Assess", "Screen or Asses"]) == "A",
            attended_not_screened: row.text(&["Attended Not Scr"]),
        })
    }

    /// Interprets a wall-clock time in the configured timezone. Times repeated
    /// by a clock change resolve to the earlier instant; times skipped by one
    /// are rejected.
    pub fn to_utc(&self, column: &str, naive: NaiveDateTime) -> Result<DateTime<Utc>, AppointmentError> {
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| AppointmentError::InvalidField {
                column: column.to_string(),
                reason: format!("{} does not exist in {}", naive, self.timezone),
            })
    }
}

struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect();
        Self { index }
    }

    /// Position of the first of `names` present in the header.
    fn position(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| self.index.get(*name).copied())
    }
}

struct Row<'a> {
    columns: &'a Columns,
    record: &'a StringRecord,
}

impl<'a> Row<'a> {
    fn get(&self, names: &[&str]) -> Option<&'a str> {
        self.columns.position(names).and_then(|i| self.record.get(i))
    }

    fn required(&self, names: &[&str]) -> Result<&'a str, AppointmentError> {
        match self.get(names) {
            Some(value) if !value.is_empty() => Ok(value),
            Some(_) => Err(invalid(names[0], "")),
            None => Err(AppointmentError::MissingColumn(names.join("/"))),
        }
    }

    fn text(&self, names: &[&str]) -> String {
        self.get(names).unwrap_or_default().to_string()
    }
}

fn malformed(filename: &str, reason: &str) -> AppointmentError {
    AppointmentError::MalformedExtract {
        filename: filename.to_string(),
        reason: reason.to_string(),
    }
}

fn invalid(column: &str, value: &str) -> AppointmentError {
    AppointmentError::InvalidField {
        column: column.to_string(),
        reason: format!("unexpected value '{}'", value),
    }
}
