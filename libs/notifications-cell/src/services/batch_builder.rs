// libs/notifications-cell/src/services/batch_builder.rs
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use shared_database::{AppointmentRepository, MessageBatchRepository};
use shared_models::{Message, MessageBatch};

use crate::models::NotificationsError;

/// Appointments are messaged this far ahead of the end of the current day.
pub const LOOKAHEAD_WEEKS: i64 = 4;
pub const LOOKAHEAD_DAYS: i64 = 4;

/// The latest appointment start included in a batch built at `now`: the last
/// instant of the local day four weeks and four days from today. The window
/// is counted in calendar days so clock changes do not shift it.
pub fn lookahead_cutoff(now: DateTime<Utc>, timezone: Tz) -> DateTime<Utc> {
    let today = now.with_timezone(&timezone).date_naive();
    let last_day = today + Duration::weeks(LOOKAHEAD_WEEKS) + Duration::days(LOOKAHEAD_DAYS);
    let end_of_day = last_day.and_time(
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or_default(),
    );

    // 23:59 is never inside a clock change in the zones we run in; fall back
    // to the UTC reading if it ever is.
    timezone
        .from_local_datetime(&end_of_day)
        .latest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&end_of_day))
}

/// Groups booked, unmessaged appointments inside the lookahead window into
/// a new scheduled batch.
pub struct BatchBuilder {
    appointments: Arc<dyn AppointmentRepository>,
    batches: Arc<dyn MessageBatchRepository>,
    timezone: Tz,
}

impl BatchBuilder {
    pub fn new(
        appointments: Arc<dyn AppointmentRepository>,
        batches: Arc<dyn MessageBatchRepository>,
        timezone: Tz,
    ) -> Self {
        Self { appointments, batches, timezone }
    }

    pub async fn build(
        &self,
        routing_plan_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(MessageBatch, Vec<Message>), NotificationsError> {
        let cutoff = lookahead_cutoff(now, self.timezone);
        info!("Finding appointments to include in batch (starting on or before {})", cutoff);

        let appointments = self.appointments.appointments_due_for_messaging(cutoff).await?;
        if appointments.is_empty() {
            return Err(NotificationsError::NothingToBatch);
        }
        info!("Found {} appointments to batch", appointments.len());

        let batch = MessageBatch::new(Some(routing_plan_id), now);
        let messages: Vec<Message> = appointments
            .iter()
            .map(|a| Message::for_appointment(a.id, batch.id, now))
            .collect();

        self.batches.create_batch_with_messages(&batch, &messages).await?;
        info!("Created MessageBatch with ID {} containing {} messages", batch.id, messages.len());

        Ok((batch, messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_is_end_of_local_day_plus_thirty_two_days() {
        // 10:00 BST on 1 July
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap();

        let cutoff = lookahead_cutoff(now, chrono_tz::Europe::London);

        // 23:59:59.999999 BST on 1 July, plus 32 days
        let expected = Utc.with_ymd_and_hms(2025, 8, 2, 22, 59, 59).unwrap() + Duration::microseconds(999_999);
        assert_eq!(cutoff, expected);
    }

    #[test]
    fn cutoff_follows_local_clock_across_a_clock_change() {
        // 1 October is BST, 2 November is GMT
        let now = Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap();

        let cutoff = lookahead_cutoff(now, chrono_tz::Europe::London);

        let expected = Utc.with_ymd_and_hms(2025, 11, 2, 23, 59, 59).unwrap() + Duration::microseconds(999_999);
        assert_eq!(cutoff, expected);
    }

    #[test]
    fn cutoff_uses_the_local_date() {
        // 23:30 UTC on 30 June is already 1 July in London
        let now = Utc.with_ymd_and_hms(2025, 6, 30, 23, 30, 0).unwrap();

        let cutoff = lookahead_cutoff(now, chrono_tz::Europe::London);

        assert_eq!(cutoff.date_naive(), chrono::NaiveDate::from_ymd_opt(2025, 8, 2).unwrap());
    }
}
