//! Append-only sealed audit log with hash-chain integrity.
//!
//! Every protection-core action (blackout transitions, backfill runs,
//! allowlist degradation, rejected partner calls) is recorded here and only
//! here. The log lives in the sealed store; the only read path requires a
//! [`CompliancePrincipal`].
//!
//! # Integrity
//!
//! Each entry's `integrity_hash` is `blake3(prev_hash || canonical(entry))`,
//! chaining it to the previous entry. A single-byte mutation of any
//! historical entry breaks verification from that point on. On a detected
//! break the log refuses to serve reads until the chain is re-verified
//! clean; the failure surfaces to the compliance channel only.
//!
//! # Contract
//!
//! There is no update and no delete. Neither this type nor the sealed
//! store beneath it exposes one.

mod canonical;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::principal::CompliancePrincipal;
use crate::store::{SealedStore, StoreError};

pub use canonical::{canonicalize, CanonicalError, MAX_DEPTH};

/// Size of a chain hash in bytes.
pub const HASH_LEN: usize = 32;

/// A 32-byte chain hash.
pub type ChainHash = [u8; HASH_LEN];

/// The zero hash chained to the first entry.
pub const GENESIS_HASH: ChainHash = [0u8; HASH_LEN];

/// Well-known audit action names.
pub mod actions {
    /// A blackout was opened with a distress signal.
    pub const BLACKOUT_OPENED: &str = "blackout.opened";
    /// A partner extended a blackout.
    pub const BLACKOUT_EXTENDED: &str = "blackout.extended";
    /// A partner released a blackout early.
    pub const BLACKOUT_RELEASED: &str = "blackout.released";
    /// The expiry sweep closed a blackout.
    pub const BLACKOUT_EXPIRED: &str = "blackout.expired";
    /// A transition was rejected for authorization reasons.
    pub const BLACKOUT_REJECTED: &str = "blackout.rejected";
    /// A gap interval was filled with synthetic entries.
    pub const BACKFILL_COMPLETED: &str = "backfill.completed";
    /// The allowlist feed is empty or stale; matching is degraded.
    pub const ALLOWLIST_DEGRADED: &str = "allowlist.degraded";
    /// The allowlist feed recovered.
    pub const ALLOWLIST_REFRESHED: &str = "allowlist.refreshed";
}

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuditError {
    /// Sealed-store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The entry could not be canonicalized for hashing.
    #[error("entry cannot be canonicalized: {0}")]
    Canonical(#[from] CanonicalError),

    /// The entry's metadata is not valid JSON.
    #[error("entry metadata is not valid JSON: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Hash-chain verification failed.
    #[error("audit chain broken at seq {seq}")]
    ChainBroken {
        /// The first sequence number that failed verification.
        seq: u64,
    },

    /// Reads are refused until the chain verifies clean again.
    #[error("audit log refusing reads after integrity failure")]
    IntegrityRefused,
}

/// One sealed audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedAuditEntry {
    /// Sequence number (assigned on append).
    pub seq: Option<u64>,
    /// Entry identifier.
    pub id: String,
    /// Dotted action name, see [`actions`].
    pub action: String,
    /// Acting principal's display form.
    pub actor_id: String,
    /// Entry instant, nanoseconds since Unix epoch.
    pub timestamp_ns: u64,
    /// Subject the action concerns.
    pub subject_ref: String,
    /// JSON metadata (canonical-form constraints apply: integers only).
    pub metadata: String,
    /// Hash of the previous entry, or [`GENESIS_HASH`].
    pub prev_hash: ChainHash,
    /// `blake3(prev_hash || canonical(entry))`.
    pub integrity_hash: ChainHash,
}

impl SealedAuditEntry {
    /// Computes this entry's canonical hashing form.
    ///
    /// Covers everything except `seq` and the hashes themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata is invalid JSON or cannot be
    /// canonicalized.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, AuditError> {
        let metadata: Value = serde_json::from_str(&self.metadata)?;
        let canonical = canonicalize(&json!({
            "action": self.action,
            "actor_id": self.actor_id,
            "id": self.id,
            "metadata": metadata,
            "subject_ref": self.subject_ref,
            "timestamp_ns": self.timestamp_ns,
        }))?;
        Ok(canonical.into_bytes())
    }

    /// Computes the chained hash for this entry's content.
    ///
    /// # Errors
    ///
    /// Returns an error if the canonical form cannot be produced.
    pub fn compute_hash(&self) -> Result<ChainHash, AuditError> {
        let content = self.canonical_bytes()?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.prev_hash);
        hasher.update(&content);
        Ok(*hasher.finalize().as_bytes())
    }
}

/// Filter for compliance audit queries.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Restrict to one acting principal.
    pub actor_id: Option<String>,
    /// Restrict to one subject.
    pub subject_ref: Option<String>,
    /// Restrict to actions starting with this prefix (e.g. `"blackout."`).
    pub action_prefix: Option<String>,
    /// Maximum entries returned.
    pub limit: u64,
}

impl AuditFilter {
    /// A filter returning up to `limit` entries with no other restriction.
    #[must_use]
    pub fn all(limit: u64) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

/// The append-only sealed audit log.
///
/// Appends are serialized through an internal head lock so the chain has a
/// single linear order regardless of how many actors write concurrently.
pub struct SealedAuditLog {
    store: Arc<SealedStore>,
    /// Hash of the newest entry; appends extend from here.
    head: Mutex<ChainHash>,
    /// Set once verification fails; reads refuse while set.
    integrity_failed: AtomicBool,
}

impl SealedAuditLog {
    /// Opens the log over a sealed store, resuming the chain from the
    /// newest persisted entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the head cannot be read.
    pub fn open(store: Arc<SealedStore>) -> Result<Self, AuditError> {
        let head = match store.last_audit()? {
            Some((_, hash)) => hash,
            None => GENESIS_HASH,
        };
        Ok(Self {
            store,
            head: Mutex::new(head),
            integrity_failed: AtomicBool::new(false),
        })
    }

    /// Appends an entry, computing its chained hash.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing or the underlying insert fails.
    #[allow(clippy::missing_panics_doc)] // head lock poisoning is unrecoverable
    pub fn append(
        &self,
        action: &str,
        actor_id: &str,
        subject_ref: &str,
        metadata: Value,
        timestamp_ns: u64,
    ) -> Result<SealedAuditEntry, AuditError> {
        let mut head = self.head.lock().unwrap();

        let mut entry = SealedAuditEntry {
            seq: None,
            id: Uuid::new_v4().to_string(),
            action: action.to_string(),
            actor_id: actor_id.to_string(),
            timestamp_ns,
            subject_ref: subject_ref.to_string(),
            metadata: metadata.to_string(),
            prev_hash: *head,
            integrity_hash: GENESIS_HASH,
        };
        entry.integrity_hash = entry.compute_hash()?;

        let seq = self.store.append_audit(&entry)?;
        entry.seq = Some(seq);
        *head = entry.integrity_hash;
        Ok(entry)
    }

    /// Verifies the whole chain from genesis.
    ///
    /// A clean pass clears any earlier refusal; a failure sets it.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainBroken`] at the first bad entry.
    pub fn verify_chain(&self) -> Result<(), AuditError> {
        let mut expected_prev = GENESIS_HASH;
        let mut cursor = 1u64;
        const BATCH: u64 = 512;

        loop {
            let entries = self.store.read_audit_from(cursor, BATCH)?;
            if entries.is_empty() {
                break;
            }
            for entry in &entries {
                let seq = entry.seq.unwrap_or(0);
                if entry.prev_hash != expected_prev {
                    self.integrity_failed.store(true, Ordering::SeqCst);
                    return Err(AuditError::ChainBroken { seq });
                }
                let computed = entry.compute_hash()?;
                if computed != entry.integrity_hash {
                    self.integrity_failed.store(true, Ordering::SeqCst);
                    return Err(AuditError::ChainBroken { seq });
                }
                expected_prev = entry.integrity_hash;
            }
            cursor = entries.last().and_then(|e| e.seq).unwrap_or(cursor) + 1;
        }

        self.integrity_failed.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Reads entries matching a filter.
    ///
    /// Only callable with a compliance credential; refuses if the chain
    /// failed its last verification.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::IntegrityRefused`] after an integrity failure,
    /// or a store error if the query fails.
    pub fn query(
        &self,
        _principal: &CompliancePrincipal,
        filter: &AuditFilter,
    ) -> Result<Vec<SealedAuditEntry>, AuditError> {
        if self.integrity_failed.load(Ordering::SeqCst) {
            return Err(AuditError::IntegrityRefused);
        }
        Ok(self.store.query_audit(filter)?)
    }

    /// Number of entries in the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn len(&self) -> Result<u64, AuditError> {
        Ok(self.store.audit_count()?)
    }

    /// Whether the log is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn is_empty(&self) -> Result<bool, AuditError> {
        Ok(self.len()? == 0)
    }
}
