//! Per-subject daily gap scheduling.
//!
//! Every subject gets 2–4 short "privacy gaps" per day at unpredictable
//! times. Real suppression hides among them: an observer of the family
//! timeline cannot tell a camouflage gap from a crisis-driven one.
//!
//! # Determinism
//!
//! A schedule is a pure function of `(salt, subject_id, date)`. Within the
//! day, regeneration is idempotent — any replica computes the same windows
//! without coordination. The salt lives only in the sealed domain, so an
//! observer who knows the algorithm and the subject id still cannot
//! predict the windows.
//!
//! Schedules are ephemeral. The cache drops a schedule once its date has
//! passed; nothing persists them, which leaves no corpus for historical
//! pattern analysis.

mod keystream;


use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};
use secrecy::{ExposeSecret, Secret};
use thiserror::Error;

use crate::config::ScheduleConfig;
use crate::store::{SealedStore, StoreError};
use crate::subject::{previous_date, SubjectContext, MINUTES_PER_DAY};

pub use keystream::DeterministicStream;

/// Bounded placement attempts per window before giving up.
const MAX_PLACEMENT_ATTEMPTS: u32 = 100;

/// Gap duration bounds in minutes.
const MIN_GAP_MINUTES: u32 = 5;
const MAX_GAP_MINUTES: u32 = 15;

/// Errors that can occur during schedule operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScheduleError {
    /// Window placement exhausted its attempt budget.
    #[error("could not place gap windows for {subject_id} on {date}")]
    PlacementFailed {
        /// The subject.
        subject_id: String,
        /// The date that failed.
        date: NaiveDate,
    },

    /// The subject's salt could not be resolved.
    #[error("salt unavailable for {subject_id}: {details}")]
    SaltUnavailable {
        /// The subject.
        subject_id: String,
        /// What went wrong.
        details: String,
    },
}

/// Resolves per-subject schedule salts from the sealed domain.
pub trait SaltProvider: Send + Sync {
    /// Returns the subject's 32-byte salt, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the salt cannot be resolved.
    fn subject_salt(&self, subject_id: &str) -> Result<[u8; 32], ScheduleError>;
}

impl SaltProvider for SealedStore {
    fn subject_salt(&self, subject_id: &str) -> Result<[u8; 32], ScheduleError> {
        SealedStore::subject_salt(self, subject_id).map_err(|err: StoreError| {
            ScheduleError::SaltUnavailable {
                subject_id: subject_id.to_string(),
                details: err.to_string(),
            }
        })
    }
}

/// Fixed-salt provider for tests and tooling.
pub struct FixedSaltProvider(pub [u8; 32]);

impl SaltProvider for FixedSaltProvider {
    fn subject_salt(&self, _subject_id: &str) -> Result<[u8; 32], ScheduleError> {
        Ok(self.0)
    }
}

/// One privacy-gap window. May wrap past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapWindow {
    /// Start minute-of-day (0..=1439) in subject-local time.
    pub start_minute: u16,
    /// Duration in minutes (5..=15).
    pub duration_minutes: u16,
}

impl GapWindow {
    /// Whether `minute` (0..=1439, same day) falls inside this window.
    #[must_use]
    pub fn contains(&self, minute: u16) -> bool {
        let end = u32::from(self.start_minute) + u32::from(self.duration_minutes);
        if end <= u32::from(MINUTES_PER_DAY) {
            minute >= self.start_minute && u32::from(minute) < end
        } else {
            minute >= self.start_minute || u32::from(minute) < end - u32::from(MINUTES_PER_DAY)
        }
    }

    /// Whether the window extends past midnight into the next day.
    #[must_use]
    pub fn wraps_midnight(&self) -> bool {
        u32::from(self.start_minute) + u32::from(self.duration_minutes)
            > u32::from(MINUTES_PER_DAY)
    }

    /// Whether `minute` of the *following* day is still covered by this
    /// window's wrapped tail.
    #[must_use]
    pub fn tail_contains(&self, minute: u16) -> bool {
        if !self.wraps_midnight() {
            return false;
        }
        let tail_end = u32::from(self.start_minute) + u32::from(self.duration_minutes)
            - u32::from(MINUTES_PER_DAY);
        u32::from(minute) < tail_end
    }
}

/// A subject's gap windows for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyGapSchedule {
    /// The subject.
    pub subject_id: String,
    /// The local calendar date the schedule covers.
    pub date: NaiveDate,
    /// 2–4 windows, sorted by start minute.
    pub windows: Vec<GapWindow>,
}

impl DailyGapSchedule {
    /// Whether the given local minute-of-day falls in any window.
    #[must_use]
    pub fn covers_minute(&self, minute: u16) -> bool {
        self.windows.iter().any(|w| w.contains(minute))
    }
}

/// Generates and caches daily gap schedules.
pub struct GapScheduler {
    config: ScheduleConfig,
    salts: Box<dyn SaltProvider>,
    cache: RwLock<HashMap<(String, NaiveDate), DailyGapSchedule>>,
    salt_cache: RwLock<HashMap<String, Secret<[u8; 32]>>>,
}

impl GapScheduler {
    /// Creates a scheduler over a salt provider.
    #[must_use]
    pub fn new(config: ScheduleConfig, salts: Box<dyn SaltProvider>) -> Self {
        Self {
            config,
            salts,
            cache: RwLock::new(HashMap::new()),
            salt_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the subject is inside a gap window at `at`.
    ///
    /// Consults the schedule for the subject's local date, plus the
    /// previous day's schedule for windows that wrap past midnight.
    ///
    /// # Errors
    ///
    /// Returns an error if a schedule cannot be generated; callers on the
    /// decision path treat that as a suppressing condition.
    pub fn is_in_gap(
        &self,
        ctx: &SubjectContext,
        at: DateTime<Utc>,
    ) -> Result<bool, ScheduleError> {
        let date = ctx.local_date(at);
        let minute = ctx.local_minute_of_day(at);

        let today = self.schedule_for(&ctx.subject_id, date)?;
        if today.covers_minute(minute) {
            return Ok(true);
        }

        // A window started late yesterday may spill past midnight.
        if u32::from(minute) < MAX_GAP_MINUTES {
            let yesterday = self.schedule_for(&ctx.subject_id, previous_date(date))?;
            if yesterday.windows.iter().any(|w| w.tail_contains(minute)) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Returns the cached schedule for `(subject_id, date)`, generating it
    /// on first lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    pub fn schedule_for(
        &self,
        subject_id: &str,
        date: NaiveDate,
    ) -> Result<DailyGapSchedule, ScheduleError> {
        let key = (subject_id.to_string(), date);
        if let Some(found) = self.cache.read().unwrap().get(&key) {
            return Ok(found.clone());
        }

        let schedule = self.generate(subject_id, date)?;
        // Last-writer-wins on a racing regeneration; both writers computed
        // the same deterministic schedule.
        self.cache
            .write()
            .unwrap()
            .insert(key, schedule.clone());
        Ok(schedule)
    }

    /// Generates the schedule for `(subject_id, date)` without caching.
    ///
    /// # Errors
    ///
    /// Returns an error if the salt is unavailable or placement fails.
    pub fn generate(
        &self,
        subject_id: &str,
        date: NaiveDate,
    ) -> Result<DailyGapSchedule, ScheduleError> {
        let salt = self.resolve_salt(subject_id)?;
        let date_text = date.format("%Y-%m-%d").to_string();
        let mut stream = DeterministicStream::new(
            "gap-schedule",
            &[
                salt.expose_secret().as_slice(),
                subject_id.as_bytes(),
                date_text.as_bytes(),
            ],
        );

        let span = u32::from(self.config.waking_span_minutes());
        let window_count = stream.next_in_range(2, 4);

        // Placement happens in waking-range-relative coordinates, which
        // linearizes a range that wraps past midnight.
        let mut placed: Vec<(u32, u32)> = Vec::with_capacity(window_count as usize);
        for _ in 0..window_count {
            let mut attempts = 0;
            loop {
                let duration = stream.next_in_range(MIN_GAP_MINUTES, MAX_GAP_MINUTES);
                let offset = stream.next_below(span - duration + 1);
                if Self::placement_ok(&placed, offset, duration, self.config.min_spacing_minutes) {
                    placed.push((offset, duration));
                    break;
                }
                attempts += 1;
                if attempts >= MAX_PLACEMENT_ATTEMPTS {
                    return Err(ScheduleError::PlacementFailed {
                        subject_id: subject_id.to_string(),
                        date,
                    });
                }
            }
        }

        let start = u32::from(self.config.waking_start_minute);
        let mut windows: Vec<GapWindow> = placed
            .into_iter()
            .map(|(offset, duration)| GapWindow {
                start_minute: ((start + offset) % u32::from(MINUTES_PER_DAY)) as u16,
                duration_minutes: duration as u16,
            })
            .collect();
        windows.sort_by_key(|w| w.start_minute);

        Ok(DailyGapSchedule {
            subject_id: subject_id.to_string(),
            date,
            windows,
        })
    }

    /// Drops cached schedules older than the day before `today`.
    ///
    /// The previous day is retained for midnight-wrap checks.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    pub fn evict_expired(&self, today: NaiveDate) {
        let keep_from = previous_date(today);
        self.cache
            .write()
            .unwrap()
            .retain(|(_, date), _| *date >= keep_from);
    }

    /// Number of cached schedules.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    fn placement_ok(placed: &[(u32, u32)], offset: u32, duration: u32, spacing: u16) -> bool {
        let spacing = u32::from(spacing);
        let end = offset + duration;
        placed.iter().all(|&(other_offset, other_duration)| {
            let other_end = other_offset + other_duration;
            end + spacing <= other_offset || other_end + spacing <= offset
        })
    }

    fn resolve_salt(&self, subject_id: &str) -> Result<Secret<[u8; 32]>, ScheduleError> {
        if let Some(found) = self.salt_cache.read().unwrap().get(subject_id) {
            return Ok(Secret::new(*found.expose_secret()));
        }
        let salt = self.salts.subject_salt(subject_id)?;
        self.salt_cache
            .write()
            .unwrap()
            .insert(subject_id.to_string(), Secret::new(salt));
        Ok(Secret::new(salt))
    }
}
