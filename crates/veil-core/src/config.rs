//! Configuration parsing and validation.
//!
//! The daemon loads a single TOML file describing store locations, allowlist
//! feed settings, scheduling bounds, blackout timing, and backfill tunables.
//! Parsing is strict about internal consistency: a waking-hours range that
//! cannot fit the maximum number of gap windows is rejected at load time
//! rather than failing placement at runtime.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::subject::MINUTES_PER_DAY;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The parsed config is internally inconsistent.
    #[error("invalid config: {reason}")]
    Validation {
        /// Why the config was rejected.
        reason: String,
    },
}

/// Top-level protection-core configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    /// Storage locations.
    #[serde(default)]
    pub stores: StoreConfig,

    /// Allowlist feed settings.
    #[serde(default)]
    pub allowlist: AllowlistConfig,

    /// Gap-schedule bounds.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Blackout timing.
    #[serde(default)]
    pub blackout: BlackoutConfig,

    /// Synthetic backfill tunables.
    #[serde(default)]
    pub backfill: BackfillConfig,

    /// Partner surface settings.
    #[serde(default)]
    pub partner: PartnerConfig,
}

impl CoreConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or internally inconsistent.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the schedule bounds cannot fit
    /// the maximum window count or any range is degenerate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.schedule;
        if s.waking_start_minute >= MINUTES_PER_DAY || s.waking_end_minute > MINUTES_PER_DAY {
            return Err(ConfigError::Validation {
                reason: format!(
                    "waking range {}..{} exceeds minutes in a day",
                    s.waking_start_minute, s.waking_end_minute
                ),
            });
        }
        let span = s.waking_span_minutes();
        if span == 0 {
            return Err(ConfigError::Validation {
                reason: "waking range is empty".to_string(),
            });
        }
        // Worst case: 4 windows of 15 minutes with min spacing between each.
        let worst_case = 4 * 15 + 3 * u32::from(s.min_spacing_minutes);
        if u32::from(span) < worst_case {
            return Err(ConfigError::Validation {
                reason: format!(
                    "waking range of {span} minutes cannot fit 4 windows with \
                     {} minute spacing",
                    s.min_spacing_minutes
                ),
            });
        }
        if self.blackout.base_duration_hours == 0 {
            return Err(ConfigError::Validation {
                reason: "blackout base duration must be non-zero".to_string(),
            });
        }
        if self.backfill.lookback_days == 0 {
            return Err(ConfigError::Validation {
                reason: "backfill lookback must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Storage locations for the two isolated domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Family-reachable activity database.
    #[serde(default = "default_family_db")]
    pub family_db: PathBuf,

    /// Sealed database (blackouts, audit, companion tags, salts).
    #[serde(default = "default_sealed_db")]
    pub sealed_db: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            family_db: default_family_db(),
            sealed_db: default_sealed_db(),
        }
    }
}

/// Allowlist feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowlistConfig {
    /// Path the file-backed feed source reads from.
    #[serde(default = "default_feed_path")]
    pub feed_path: PathBuf,

    /// How often the refresh worker pulls the feed, in seconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Feed age beyond which a sealed staleness alarm is raised, in seconds.
    #[serde(default = "default_staleness_threshold")]
    pub staleness_threshold_secs: u64,
}

impl Default for AllowlistConfig {
    fn default() -> Self {
        Self {
            feed_path: default_feed_path(),
            refresh_interval_secs: default_refresh_interval(),
            staleness_threshold_secs: default_staleness_threshold(),
        }
    }
}

/// Gap-schedule bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// First minute of the waking-hours range (inclusive).
    #[serde(default = "default_waking_start")]
    pub waking_start_minute: u16,

    /// Last minute of the waking-hours range (exclusive). May be less than
    /// the start minute, in which case the range wraps past midnight.
    #[serde(default = "default_waking_end")]
    pub waking_end_minute: u16,

    /// Minimum spacing between gap windows, in minutes.
    #[serde(default = "default_min_spacing")]
    pub min_spacing_minutes: u16,
}

impl ScheduleConfig {
    /// Length of the waking range in minutes, accounting for wrap.
    #[must_use]
    pub fn waking_span_minutes(&self) -> u16 {
        if self.waking_end_minute > self.waking_start_minute {
            self.waking_end_minute - self.waking_start_minute
        } else {
            MINUTES_PER_DAY - self.waking_start_minute + self.waking_end_minute
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            waking_start_minute: default_waking_start(),
            waking_end_minute: default_waking_end(),
            min_spacing_minutes: default_min_spacing(),
        }
    }
}

/// Blackout timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackoutConfig {
    /// Initial blackout duration from signal creation, in hours.
    #[serde(default = "default_blackout_hours")]
    pub base_duration_hours: u32,

    /// How often the expiry sweep runs, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for BlackoutConfig {
    fn default() -> Self {
        Self {
            base_duration_hours: default_blackout_hours(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Synthetic backfill tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// How far back the history profile looks, in days.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Minimum samples in a time-of-day bucket before it is trusted;
    /// below this the profile widens to the whole history.
    #[serde(default = "default_min_bucket_samples")]
    pub min_bucket_samples: u32,

    /// Minimum total history samples before the subject's own profile is
    /// used at all; below this the population fallback applies.
    #[serde(default = "default_min_history_samples")]
    pub min_history_samples: u32,

    /// Upper bound on synthesized entries per filled gap.
    #[serde(default = "default_max_entries_per_gap")]
    pub max_entries_per_gap: u32,

    /// Base backoff between backfill retries, in seconds.
    #[serde(default = "default_backfill_backoff")]
    pub retry_backoff_secs: u64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            min_bucket_samples: default_min_bucket_samples(),
            min_history_samples: default_min_history_samples(),
            max_entries_per_gap: default_max_entries_per_gap(),
            retry_backoff_secs: default_backfill_backoff(),
        }
    }
}

/// Partner surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerConfig {
    /// Bound on extend/release request handling, in milliseconds.
    #[serde(default = "default_partner_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for PartnerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_partner_timeout(),
        }
    }
}

fn default_family_db() -> PathBuf {
    PathBuf::from("family.db")
}

fn default_sealed_db() -> PathBuf {
    PathBuf::from("sealed.db")
}

fn default_feed_path() -> PathBuf {
    PathBuf::from("allowlist.json")
}

const fn default_refresh_interval() -> u64 {
    900
}

const fn default_staleness_threshold() -> u64 {
    86_400
}

const fn default_waking_start() -> u16 {
    7 * 60
}

const fn default_waking_end() -> u16 {
    22 * 60
}

const fn default_min_spacing() -> u16 {
    120
}

const fn default_blackout_hours() -> u32 {
    48
}

const fn default_sweep_interval() -> u64 {
    60
}

const fn default_lookback_days() -> u32 {
    30
}

const fn default_min_bucket_samples() -> u32 {
    8
}

const fn default_min_history_samples() -> u32 {
    40
}

const fn default_max_entries_per_gap() -> u32 {
    6
}

const fn default_backfill_backoff() -> u64 {
    30
}

const fn default_partner_timeout() -> u64 {
    2_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CoreConfig::default();
        config.validate().expect("default config should validate");
        assert_eq!(config.schedule.waking_span_minutes(), 15 * 60);
        assert_eq!(config.blackout.base_duration_hours, 48);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = CoreConfig::from_toml(
            r#"
            [schedule]
            waking_start_minute = 480

            [blackout]
            base_duration_hours = 48
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.schedule.waking_start_minute, 480);
        assert_eq!(config.schedule.min_spacing_minutes, 120);
        assert_eq!(config.backfill.lookback_days, 30);
    }

    #[test]
    fn rejects_waking_range_too_small_for_windows() {
        let err = CoreConfig::from_toml(
            r#"
            [schedule]
            waking_start_minute = 540
            waking_end_minute = 720
            "#,
        )
        .expect_err("3h range cannot fit 4 spaced windows");

        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn rejects_out_of_range_minutes() {
        let err = CoreConfig::from_toml(
            r#"
            [schedule]
            waking_start_minute = 2000
            "#,
        )
        .expect_err("minute beyond 1439 must be rejected");

        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn wrapping_waking_range_has_correct_span() {
        let schedule = ScheduleConfig {
            waking_start_minute: 22 * 60,
            waking_end_minute: 14 * 60,
            min_spacing_minutes: 120,
        };
        assert_eq!(schedule.waking_span_minutes(), 16 * 60);
    }

    #[test]
    fn rejects_zero_blackout_duration() {
        let err = CoreConfig::from_toml(
            r#"
            [blackout]
            base_duration_hours = 0
            "#,
        )
        .expect_err("zero-duration blackout must be rejected");

        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = CoreConfig::default();
        let text = toml::to_string_pretty(&config).expect("serialize");
        let parsed = CoreConfig::from_toml(&text).expect("reparse");
        assert_eq!(parsed.schedule.waking_end_minute, 22 * 60);
    }
}
