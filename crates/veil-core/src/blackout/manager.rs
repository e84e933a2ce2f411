//! Blackout manager implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde_json::json;
use uuid::Uuid;

use super::error::BlackoutError;
use super::state::{BlackoutExtension, BlackoutStatus, ExtensionIncrement, SignalBlackout};
use crate::audit::{actions, SealedAuditLog};
use crate::config::BlackoutConfig;
use crate::principal::PartnerPrincipal;
use crate::store::SealedStore;

const NANOS_PER_HOUR: u64 = 3_600 * 1_000_000_000;

/// One active blackout as seen by the decision path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveEntry {
    started_at_ns: u64,
    expires_at_ns: u64,
}

/// Manages the blackout lifecycle and the in-memory active index.
pub struct BlackoutManager {
    store: Arc<SealedStore>,
    audit: Arc<SealedAuditLog>,
    base_duration_ns: u64,
    /// subject_id -> signal_id -> active window. Read on the hot path.
    active: RwLock<HashMap<String, HashMap<String, ActiveEntry>>>,
    /// Linearizes all state transitions.
    transitions: Mutex<()>,
}

impl BlackoutManager {
    /// Creates a manager, warming the active index from the sealed store.
    ///
    /// # Errors
    ///
    /// Returns an error if active blackouts cannot be loaded.
    pub fn open(
        store: Arc<SealedStore>,
        audit: Arc<SealedAuditLog>,
        config: &BlackoutConfig,
    ) -> Result<Self, BlackoutError> {
        let mut active: HashMap<String, HashMap<String, ActiveEntry>> = HashMap::new();
        for blackout in store.active_blackouts()? {
            active.entry(blackout.subject_id.clone()).or_default().insert(
                blackout.signal_id.clone(),
                ActiveEntry {
                    started_at_ns: blackout.started_at_ns,
                    expires_at_ns: blackout.expires_at_ns,
                },
            );
        }
        Ok(Self {
            store,
            audit,
            base_duration_ns: u64::from(config.base_duration_hours) * NANOS_PER_HOUR,
            active: RwLock::new(active),
            transitions: Mutex::new(()),
        })
    }

    /// Opens a blackout atomically with signal creation.
    ///
    /// # Errors
    ///
    /// Returns [`BlackoutError::AlreadyExists`] if the signal already has
    /// one.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    pub fn open_blackout(
        &self,
        subject_id: &str,
        signal_id: &str,
        actor_id: &str,
        now_ns: u64,
    ) -> Result<SignalBlackout, BlackoutError> {
        let _guard = self.transitions.lock().unwrap();

        let blackout = SignalBlackout {
            id: Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            signal_id: signal_id.to_string(),
            started_at_ns: now_ns,
            expires_at_ns: now_ns + self.base_duration_ns,
            extensions: Vec::new(),
            status: BlackoutStatus::Active,
        };

        if !self.store.insert_blackout(&blackout)? {
            let existing = self
                .store
                .load_blackout(signal_id)?
                .ok_or_else(|| BlackoutError::Conflict {
                    signal_id: signal_id.to_string(),
                })?;
            return Err(BlackoutError::AlreadyExists {
                signal_id: signal_id.to_string(),
                blackout_id: existing.id,
            });
        }

        self.audit.append(
            actions::BLACKOUT_OPENED,
            actor_id,
            subject_id,
            json!({
                "signal_id": signal_id,
                "blackout_id": blackout.id,
                "expires_at_ns": blackout.expires_at_ns,
            }),
            now_ns,
        )?;

        self.active
            .write()
            .unwrap()
            .entry(subject_id.to_string())
            .or_default()
            .insert(
                signal_id.to_string(),
                ActiveEntry {
                    started_at_ns: now_ns,
                    expires_at_ns: blackout.expires_at_ns,
                },
            );

        Ok(blackout)
    }

    /// Extends an active blackout by a fixed increment.
    ///
    /// Only partner principals may call this; the deadline strictly
    /// increases. A blackout whose deadline already passed is expired here
    /// rather than extended, even if the sweep has not caught it yet.
    ///
    /// # Errors
    ///
    /// Returns [`BlackoutError::NotFound`] for unknown signals,
    /// [`BlackoutError::AlreadyTerminal`] after release or expiry, and
    /// [`BlackoutError::Conflict`] if a competing transition won.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    pub fn extend(
        &self,
        signal_id: &str,
        partner: &PartnerPrincipal,
        increment: ExtensionIncrement,
        reason: &str,
        now_ns: u64,
    ) -> Result<SignalBlackout, BlackoutError> {
        let _guard = self.transitions.lock().unwrap();

        let blackout =
            self.store
                .load_blackout(signal_id)?
                .ok_or_else(|| BlackoutError::NotFound {
                    signal_id: signal_id.to_string(),
                })?;

        if blackout.status.is_terminal() {
            return Err(BlackoutError::AlreadyTerminal {
                signal_id: signal_id.to_string(),
                current_status: blackout.status.as_str().to_string(),
            });
        }

        if blackout.expired_by(now_ns) {
            self.expire_locked(&blackout, now_ns)?;
            return Err(BlackoutError::AlreadyTerminal {
                signal_id: signal_id.to_string(),
                current_status: BlackoutStatus::Expired.as_str().to_string(),
            });
        }

        let new_expires_at_ns = blackout.expires_at_ns + increment.nanos();
        let extension = BlackoutExtension {
            extended_by: partner.partner_id.clone(),
            extended_at_ns: now_ns,
            additional_hours: increment.hours(),
            reason: reason.to_string(),
        };

        let applied = self.store.transition_blackout(
            signal_id,
            BlackoutStatus::Active,
            BlackoutStatus::Active,
            Some(new_expires_at_ns),
            Some(&extension),
        )?;
        if !applied {
            return Err(BlackoutError::Conflict {
                signal_id: signal_id.to_string(),
            });
        }

        self.audit.append(
            actions::BLACKOUT_EXTENDED,
            &partner.to_string(),
            &blackout.subject_id,
            json!({
                "signal_id": signal_id,
                "additional_hours": increment.hours(),
                "expires_at_ns": new_expires_at_ns,
            }),
            now_ns,
        )?;

        if let Some(entries) = self.active.write().unwrap().get_mut(&blackout.subject_id) {
            if let Some(entry) = entries.get_mut(signal_id) {
                entry.expires_at_ns = new_expires_at_ns;
            }
        }

        self.store
            .load_blackout(signal_id)?
            .ok_or_else(|| BlackoutError::Conflict {
                signal_id: signal_id.to_string(),
            })
    }

    /// Releases an active blackout early.
    ///
    /// Idempotent: releasing a blackout that is already released or
    /// expired is a no-op. Returns the blackout this call transitioned, or
    /// `None` for a no-op, so the caller can close out the suppressed
    /// interval.
    ///
    /// # Errors
    ///
    /// Returns [`BlackoutError::NotFound`] for unknown signals.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    pub fn release(
        &self,
        signal_id: &str,
        partner: &PartnerPrincipal,
        reason: &str,
        now_ns: u64,
    ) -> Result<Option<SignalBlackout>, BlackoutError> {
        let _guard = self.transitions.lock().unwrap();

        let blackout =
            self.store
                .load_blackout(signal_id)?
                .ok_or_else(|| BlackoutError::NotFound {
                    signal_id: signal_id.to_string(),
                })?;

        if blackout.status.is_terminal() {
            return Ok(None);
        }

        let applied = self.store.transition_blackout(
            signal_id,
            BlackoutStatus::Active,
            BlackoutStatus::Released,
            None,
            None,
        )?;
        if !applied {
            // A competing transition already terminated it; release is
            // idempotent either way.
            return Ok(None);
        }

        self.audit.append(
            actions::BLACKOUT_RELEASED,
            &partner.to_string(),
            &blackout.subject_id,
            json!({"signal_id": signal_id, "reason": reason}),
            now_ns,
        )?;

        self.remove_from_index(&blackout.subject_id, signal_id);
        Ok(Some(SignalBlackout {
            status: BlackoutStatus::Released,
            ..blackout
        }))
    }

    /// Expires all active blackouts whose deadline has passed.
    ///
    /// Returns the blackouts that were expired by this sweep, for
    /// downstream gap-close handling. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    pub fn sweep_expired(&self, now_ns: u64) -> Result<Vec<SignalBlackout>, BlackoutError> {
        let _guard = self.transitions.lock().unwrap();

        let mut expired = Vec::new();
        for blackout in self.store.active_blackouts()? {
            if blackout.expired_by(now_ns) {
                if self.expire_locked(&blackout, now_ns)? {
                    expired.push(blackout);
                }
            }
        }
        Ok(expired)
    }

    /// Whether any active blackout covers the subject at `at_ns`.
    ///
    /// In-memory only; safe on the hot decision path.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    #[must_use]
    pub fn active_for(&self, subject_id: &str, at_ns: u64) -> bool {
        self.active
            .read()
            .unwrap()
            .get(subject_id)
            .is_some_and(|entries| {
                entries
                    .values()
                    .any(|e| at_ns >= e.started_at_ns && at_ns < e.expires_at_ns)
            })
    }

    /// Subjects that currently have an active blackout covering `at_ns`.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    #[must_use]
    pub fn blacked_out_subjects(&self, at_ns: u64) -> Vec<String> {
        self.active
            .read()
            .unwrap()
            .iter()
            .filter(|(_, entries)| {
                entries
                    .values()
                    .any(|e| at_ns >= e.started_at_ns && at_ns < e.expires_at_ns)
            })
            .map(|(subject, _)| subject.clone())
            .collect()
    }

    /// Seals an audit record for a rejected transition attempt and returns
    /// the matching error.
    ///
    /// The partner surface calls this when a caller fails partner
    /// verification; nothing about the rejection is visible family-side.
    ///
    /// # Errors
    ///
    /// Always returns [`BlackoutError::Unauthorized`] once the rejection
    /// has been recorded.
    pub fn reject_unauthorized(
        &self,
        principal_display: &str,
        signal_id: &str,
        now_ns: u64,
    ) -> BlackoutError {
        let seal = self.audit.append(
            actions::BLACKOUT_REJECTED,
            principal_display,
            "-",
            json!({"signal_id": signal_id}),
            now_ns,
        );
        if let Err(err) = seal {
            tracing::warn!(error = %err, "failed to seal rejected-transition record");
        }
        BlackoutError::Unauthorized {
            principal: principal_display.to_string(),
        }
    }

    /// Expires one blackout; caller holds the transition lock.
    ///
    /// Returns `false` if a competing transition already terminated it.
    fn expire_locked(
        &self,
        blackout: &SignalBlackout,
        now_ns: u64,
    ) -> Result<bool, BlackoutError> {
        let applied = self.store.transition_blackout(
            &blackout.signal_id,
            BlackoutStatus::Active,
            BlackoutStatus::Expired,
            None,
            None,
        )?;
        if !applied {
            return Ok(false);
        }

        self.audit.append(
            actions::BLACKOUT_EXPIRED,
            "core.sweep",
            &blackout.subject_id,
            json!({
                "signal_id": blackout.signal_id,
                "expired_at_ns": blackout.expires_at_ns,
            }),
            now_ns,
        )?;

        self.remove_from_index(&blackout.subject_id, &blackout.signal_id);
        Ok(true)
    }

    fn remove_from_index(&self, subject_id: &str, signal_id: &str) {
        let mut active = self.active.write().unwrap();
        if let Some(entries) = active.get_mut(subject_id) {
            entries.remove(signal_id);
            if entries.is_empty() {
                active.remove(subject_id);
            }
        }
    }
}
