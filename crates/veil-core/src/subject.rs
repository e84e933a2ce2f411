//! Per-subject call context.
//!
//! Every decision-path call takes an explicit [`SubjectContext`] instead of
//! consulting module-level state. The context carries what the synchronous
//! path needs to localize a timestamp; subject-scoped secrets (the schedule
//! salt) are resolved internally from the sealed domain and never appear
//! here.

use chrono::{DateTime, NaiveDate, Timelike, Utc};

/// Minutes in a day.
pub const MINUTES_PER_DAY: u16 = 1440;

/// Context for one monitored subject, passed into decision and scheduling
/// calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectContext {
    /// Subject account identifier.
    pub subject_id: String,
    /// Offset of the subject's local time from UTC, in minutes.
    ///
    /// The enrolling collaborator keeps this current across DST shifts.
    pub utc_offset_minutes: i32,
}

impl SubjectContext {
    /// Creates a context for a subject in the given UTC offset.
    #[must_use]
    pub fn new(subject_id: impl Into<String>, utc_offset_minutes: i32) -> Self {
        Self {
            subject_id: subject_id.into(),
            utc_offset_minutes,
        }
    }

    /// Returns the subject's local calendar date for a UTC instant.
    #[must_use]
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        self.localize(at).date_naive()
    }

    /// Returns the subject's local minute-of-day (0..1439) for a UTC instant.
    #[must_use]
    pub fn local_minute_of_day(&self, at: DateTime<Utc>) -> u16 {
        let local = self.localize(at);
        u16::try_from(local.hour() * 60 + local.minute()).unwrap_or(0)
    }

    fn localize(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        at + chrono::Duration::minutes(i64::from(self.utc_offset_minutes))
    }
}

/// Returns the previous calendar date, used when checking gap windows that
/// wrap past midnight.
#[must_use]
pub fn previous_date(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn local_minute_respects_offset() {
        let ctx = SubjectContext::new("subject-1", -300); // UTC-5
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 14, 30, 0).unwrap();

        assert_eq!(ctx.local_minute_of_day(at), 9 * 60 + 30);
        assert_eq!(
            ctx.local_date(at),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
    }

    #[test]
    fn local_date_rolls_backward_across_midnight() {
        let ctx = SubjectContext::new("subject-1", -300);
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap();

        assert_eq!(
            ctx.local_date(at),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap()
        );
        assert_eq!(ctx.local_minute_of_day(at), 22 * 60);
    }

    #[test]
    fn local_date_rolls_forward_across_midnight() {
        let ctx = SubjectContext::new("subject-1", 600); // UTC+10
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap();

        assert_eq!(
            ctx.local_date(at),
            NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
        );
    }

    #[test]
    fn previous_date_steps_back_one_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            previous_date(date),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }
}
