//! The suppression decision chokepoint.
//!
//! Capture pipelines call [`SuppressionEngine::should_suppress`] before
//! persisting anything. The answer is a bare `bool`: a crisis-site visit, a
//! scheduled camouflage gap, and an active blackout produce bit-identical
//! results, and nothing on any family-reachable channel records which
//! branch fired. The cause enum exists for tests inside this crate and
//! cannot cross the crate boundary.
//!
//! The path is synchronous and in-memory: an allowlist snapshot read, a
//! cached schedule lookup, and an index probe. When the engine cannot
//! establish a confident "allow" — a schedule that fails to generate, a
//! timestamp that does not convert — it suppresses.


use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::allowlist::AllowlistHandle;
use crate::blackout::BlackoutManager;
use crate::schedule::GapScheduler;
use crate::subject::SubjectContext;

/// Why a moment was suppressed. Crate-internal on purpose: no public API,
/// log line, or stored field may carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SuppressionCause {
    /// The URL matched the protected-resource list.
    ProtectedResource,
    /// The moment fell inside a scheduled privacy gap.
    ScheduledGap,
    /// An active blackout covers the subject.
    ActiveBlackout,
    /// The engine could not establish a confident allow.
    Indeterminate,
}

/// Internal decision outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Capture may proceed.
    Allow,
    /// Capture must be skipped entirely.
    Suppress(SuppressionCause),
}

impl Verdict {
    pub(crate) fn suppressed(self) -> bool {
        matches!(self, Self::Suppress(_))
    }
}

/// The decision engine over the three suppression sources.
pub struct SuppressionEngine {
    allowlist: AllowlistHandle,
    scheduler: Arc<GapScheduler>,
    blackouts: Arc<BlackoutManager>,
}

impl SuppressionEngine {
    /// Creates an engine over shared component handles.
    #[must_use]
    pub fn new(
        allowlist: AllowlistHandle,
        scheduler: Arc<GapScheduler>,
        blackouts: Arc<BlackoutManager>,
    ) -> Self {
        Self {
            allowlist,
            scheduler,
            blackouts,
        }
    }

    /// Whether capture for this subject, moment, and URL must be skipped.
    ///
    /// The only output is the boolean. Callers must skip capture and
    /// persistence entirely on `true`, not capture-then-hide.
    #[must_use]
    pub fn should_suppress(&self, ctx: &SubjectContext, at: DateTime<Utc>, url: &str) -> bool {
        self.evaluate(ctx, at, url).suppressed()
    }

    /// Full evaluation, visible to tests in this crate only.
    pub(crate) fn evaluate(&self, ctx: &SubjectContext, at: DateTime<Utc>, url: &str) -> Verdict {
        if self.allowlist.is_protected(url) {
            return Verdict::Suppress(SuppressionCause::ProtectedResource);
        }

        match self.scheduler.is_in_gap(ctx, at) {
            Ok(true) => return Verdict::Suppress(SuppressionCause::ScheduledGap),
            Ok(false) => {}
            // No confident allow without a schedule.
            Err(_) => return Verdict::Suppress(SuppressionCause::Indeterminate),
        }

        let Some(at_ns) = at.timestamp_nanos_opt().and_then(|ns| u64::try_from(ns).ok()) else {
            return Verdict::Suppress(SuppressionCause::Indeterminate);
        };
        if self.blackouts.active_for(&ctx.subject_id, at_ns) {
            return Verdict::Suppress(SuppressionCause::ActiveBlackout);
        }

        Verdict::Allow
    }
}
