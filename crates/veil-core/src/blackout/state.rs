//! Blackout lifecycle state.

use serde::{Deserialize, Serialize};

use super::error::BlackoutError;

/// Fixed increments a partner may extend a blackout by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionIncrement {
    /// Extend by 24 hours.
    Hours24,
    /// Extend by 48 hours.
    Hours48,
    /// Extend by 72 hours.
    Hours72,
}

impl ExtensionIncrement {
    /// The increment in hours.
    #[must_use]
    pub const fn hours(self) -> u32 {
        match self {
            Self::Hours24 => 24,
            Self::Hours48 => 48,
            Self::Hours72 => 72,
        }
    }

    /// The increment in nanoseconds.
    #[must_use]
    pub const fn nanos(self) -> u64 {
        self.hours() as u64 * 3_600 * 1_000_000_000
    }
}

/// Lifecycle status of a signal blackout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlackoutStatus {
    /// Suppression in force.
    Active,
    /// Deadline passed without release.
    Expired,
    /// Ended early by a partner.
    Released,
}

impl BlackoutStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Released => "released",
        }
    }

    /// Parses the storage string form.
    ///
    /// # Errors
    ///
    /// Returns [`BlackoutError::InvalidStatus`] for unknown values.
    pub fn parse(value: &str) -> Result<Self, BlackoutError> {
        match value {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "released" => Ok(Self::Released),
            other => Err(BlackoutError::InvalidStatus {
                value: other.to_string(),
            }),
        }
    }

    /// Whether this status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Released)
    }
}

/// One partner-authorized extension of a blackout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutExtension {
    /// Partner that authorized the extension.
    pub extended_by: String,
    /// When the extension was applied, nanoseconds since Unix epoch.
    pub extended_at_ns: u64,
    /// Hours added.
    pub additional_hours: u32,
    /// Partner-supplied reason. Lives only in the sealed domain.
    pub reason: String,
}

/// A notification blackout tied to one distress signal.
///
/// Owned exclusively by the blackout manager and persisted only in the
/// sealed store. No family-visible document may reference one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalBlackout {
    /// Blackout identifier.
    pub id: String,
    /// Subject the blackout covers.
    pub subject_id: String,
    /// The distress signal this blackout was created with.
    pub signal_id: String,
    /// Start instant, nanoseconds since Unix epoch.
    pub started_at_ns: u64,
    /// Current deadline, nanoseconds since Unix epoch.
    pub expires_at_ns: u64,
    /// Extensions applied so far, in order.
    pub extensions: Vec<BlackoutExtension>,
    /// Lifecycle status.
    pub status: BlackoutStatus,
}

impl SignalBlackout {
    /// Whether the blackout covers `at_ns` (active and before the deadline).
    #[must_use]
    pub fn covers(&self, at_ns: u64) -> bool {
        self.status == BlackoutStatus::Active
            && at_ns >= self.started_at_ns
            && at_ns < self.expires_at_ns
    }

    /// Whether the deadline has passed while still marked active.
    #[must_use]
    pub fn expired_by(&self, now_ns: u64) -> bool {
        self.status == BlackoutStatus::Active && now_ns >= self.expires_at_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            BlackoutStatus::Active,
            BlackoutStatus::Expired,
            BlackoutStatus::Released,
        ] {
            assert_eq!(BlackoutStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            BlackoutStatus::parse("paused"),
            Err(BlackoutError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn covers_respects_bounds_and_status() {
        let blackout = SignalBlackout {
            id: "b-1".to_string(),
            subject_id: "subject-1".to_string(),
            signal_id: "signal-1".to_string(),
            started_at_ns: 100,
            expires_at_ns: 200,
            extensions: Vec::new(),
            status: BlackoutStatus::Active,
        };

        assert!(blackout.covers(100));
        assert!(blackout.covers(199));
        assert!(!blackout.covers(99));
        assert!(!blackout.covers(200));

        let released = SignalBlackout {
            status: BlackoutStatus::Released,
            ..blackout
        };
        assert!(!released.covers(150));
    }

    #[test]
    fn increment_hours_map_to_nanos() {
        assert_eq!(ExtensionIncrement::Hours24.hours(), 24);
        assert_eq!(
            ExtensionIncrement::Hours72.nanos(),
            72 * 3_600 * 1_000_000_000
        );
    }
}
