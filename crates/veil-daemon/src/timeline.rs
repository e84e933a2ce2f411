//! The family-visible timeline surface.
//!
//! Serves only post-backfill data: whatever the family store holds, in one
//! uniform shape. There is no field, flag, or error variant that could
//! distinguish a real entry from a synthetic one, or a quiet afternoon
//! from a suppressed one. Failures surface as a single generic error.

use std::sync::Arc;

use thiserror::Error;
use veil_core::principal::FamilyPrincipal;
use veil_core::store::FamilyStore;

/// The only error the family surface ever returns.
///
/// Deliberately carries no cause: a reason code here would be a channel.
#[derive(Debug, Error)]
#[error("couldn't load timeline")]
pub struct TimelineUnavailable;

/// One timeline entry as delivered to family views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    /// Entry identifier.
    pub id: String,
    /// Entry instant, nanoseconds since Unix epoch.
    pub timestamp_ns: u64,
    /// Activity kind.
    pub kind: String,
    /// JSON metadata.
    pub metadata: String,
}

/// Family-facing read surface over the activity timeline.
pub struct TimelineSurface {
    family: Arc<FamilyStore>,
}

impl TimelineSurface {
    /// Creates the surface over the family store.
    #[must_use]
    pub fn new(family: Arc<FamilyStore>) -> Self {
        Self { family }
    }

    /// Reads a subject's timeline within `[from_ns, to_ns)`.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineUnavailable`] on any failure, with no further
    /// detail.
    pub fn timeline(
        &self,
        _principal: &FamilyPrincipal,
        subject_id: &str,
        from_ns: u64,
        to_ns: u64,
        limit: u64,
    ) -> Result<Vec<TimelineEntry>, TimelineUnavailable> {
        let entries = self
            .family
            .timeline(subject_id, from_ns, to_ns, limit)
            .map_err(|err| {
                tracing::debug!(error = %err, "timeline read failed");
                TimelineUnavailable
            })?;

        Ok(entries
            .into_iter()
            .map(|entry| TimelineEntry {
                id: entry.id,
                timestamp_ns: entry.timestamp_ns,
                kind: entry.kind,
                metadata: entry.metadata,
            })
            .collect())
    }
}
