//! Daemon state wiring.
//!
//! Builds the protection-core component graph from configuration and owns
//! the pieces the workers and surfaces share: the subject roster and the
//! backfill queue.

use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::mpsc;
use veil_core::audit::{AuditError, SealedAuditLog};
use veil_core::blackout::{BlackoutError, BlackoutManager};
use veil_core::config::CoreConfig;
use veil_core::store::{FamilyStore, SealedStore, StoreError};
use veil_core::subject::SubjectContext;
use veil_core::{
    AllowlistHandle, GapScheduler, SuppressionEngine, SyntheticBackfillEngine,
};

/// Backfill requests are chunked to this interval so long blackouts are
/// filled hour by hour, each chunk sampled and capped independently.
const CHUNK_NS: u64 = 3_600 * 1_000_000_000;

/// Depth of the backfill queue.
const BACKFILL_QUEUE_DEPTH: usize = 1024;

/// Errors raised while building the daemon state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SetupError {
    /// A store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The audit log could not be opened.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// The blackout manager could not warm its index.
    #[error(transparent)]
    Blackout(#[from] BlackoutError),
}

/// A request to fill one closed gap interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillRequest {
    /// The subject whose timeline has the hole.
    pub subject_id: String,
    /// Interval start, nanoseconds since Unix epoch.
    pub gap_start_ns: u64,
    /// Interval end, nanoseconds since Unix epoch.
    pub gap_end_ns: u64,
}

/// Splits `[start, end)` into hour-sized fill requests.
#[must_use]
pub fn chunk_interval(subject_id: &str, start_ns: u64, end_ns: u64) -> Vec<FillRequest> {
    let mut chunks = Vec::new();
    let mut cursor = start_ns;
    while cursor < end_ns {
        let chunk_end = (cursor + CHUNK_NS).min(end_ns);
        chunks.push(FillRequest {
            subject_id: subject_id.to_string(),
            gap_start_ns: cursor,
            gap_end_ns: chunk_end,
        });
        cursor = chunk_end;
    }
    chunks
}

/// Shared daemon state: the component graph plus runtime registries.
pub struct DaemonState {
    /// Loaded configuration.
    pub config: CoreConfig,
    /// Shared allowlist snapshot.
    pub allowlist: AllowlistHandle,
    /// Gap scheduler with its per-day cache.
    pub scheduler: Arc<GapScheduler>,
    /// Blackout lifecycle manager.
    pub blackouts: Arc<BlackoutManager>,
    /// Synthetic backfill engine.
    pub backfill: Arc<SyntheticBackfillEngine>,
    /// Sealed audit log.
    pub audit: Arc<SealedAuditLog>,
    /// Family-domain store.
    pub family: Arc<FamilyStore>,
    /// The decision chokepoint handed to the capture pipeline.
    pub engine: Arc<SuppressionEngine>,
    subjects: RwLock<Vec<SubjectContext>>,
    backfill_tx: mpsc::Sender<FillRequest>,
}

impl DaemonState {
    /// Builds the component graph from configuration.
    ///
    /// Returns the shared state and the receiving end of the backfill
    /// queue, which the backfill worker owns.
    ///
    /// # Errors
    ///
    /// Returns an error if a store, the audit log, or the blackout index
    /// cannot be opened.
    pub fn build(
        config: CoreConfig,
    ) -> Result<(Arc<Self>, mpsc::Receiver<FillRequest>), SetupError> {
        let family = Arc::new(FamilyStore::open(&config.stores.family_db)?);
        let sealed = Arc::new(SealedStore::open(&config.stores.sealed_db)?);
        let audit = Arc::new(SealedAuditLog::open(Arc::clone(&sealed))?);

        let allowlist = AllowlistHandle::default();
        let scheduler = Arc::new(GapScheduler::new(
            config.schedule.clone(),
            Box::new(SealedSalts(Arc::clone(&sealed))),
        ));
        let blackouts = Arc::new(BlackoutManager::open(
            Arc::clone(&sealed),
            Arc::clone(&audit),
            &config.blackout,
        )?);
        let backfill = Arc::new(SyntheticBackfillEngine::new(
            Arc::clone(&family),
            Arc::clone(&sealed),
            Arc::clone(&audit),
            config.backfill.clone(),
        ));
        let engine = Arc::new(SuppressionEngine::new(
            allowlist.clone(),
            Arc::clone(&scheduler),
            Arc::clone(&blackouts),
        ));

        let (backfill_tx, backfill_rx) = mpsc::channel(BACKFILL_QUEUE_DEPTH);

        let state = Arc::new(Self {
            config,
            allowlist,
            scheduler,
            blackouts,
            backfill,
            audit,
            family,
            engine,
            subjects: RwLock::new(Vec::new()),
            backfill_tx,
        });
        Ok((state, backfill_rx))
    }

    /// Registers a monitored subject with the roster.
    ///
    /// The enrolling collaborator calls this once per subject; an existing
    /// registration for the same subject is replaced, which is how offset
    /// updates (DST shifts, moves) land.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    pub fn register_subject(&self, ctx: SubjectContext) {
        let mut subjects = self.subjects.write().unwrap();
        subjects.retain(|s| s.subject_id != ctx.subject_id);
        subjects.push(ctx);
    }

    /// Snapshot of the subject roster.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    #[must_use]
    pub fn subjects(&self) -> Vec<SubjectContext> {
        self.subjects.read().unwrap().clone()
    }

    /// Sender half of the backfill queue.
    #[must_use]
    pub fn backfill_sender(&self) -> mpsc::Sender<FillRequest> {
        self.backfill_tx.clone()
    }

    /// Enqueues a closed gap for backfill, chunked hourly.
    ///
    /// The capture pipeline calls this when a suppression interval it
    /// observed has ended; the expiry sweep and partner release paths use
    /// it for blackout intervals.
    pub async fn enqueue_gap(&self, subject_id: &str, start_ns: u64, end_ns: u64) {
        for request in chunk_interval(subject_id, start_ns, end_ns) {
            if self.backfill_tx.send(request).await.is_err() {
                tracing::warn!("backfill queue closed; dropping fill request");
                return;
            }
        }
    }
}

/// Adapter giving the scheduler its salts from the sealed store.
struct SealedSalts(Arc<SealedStore>);

impl veil_core::schedule::SaltProvider for SealedSalts {
    fn subject_salt(
        &self,
        subject_id: &str,
    ) -> Result<[u8; 32], veil_core::schedule::ScheduleError> {
        veil_core::schedule::SaltProvider::subject_salt(self.0.as_ref(), subject_id)
    }
}
