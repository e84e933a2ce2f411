//! The external-partner surface.
//!
//! Verified crisis-line partners extend and release blackouts here.
//! Requests are bounded by a timeout; because every transition is atomic
//! in the sealed store, a timed-out request leaves the blackout either
//! unchanged or fully transitioned — never partial. Conflicting
//! transitions (a racing expiry sweep) are retried with backoff.
//!
//! Released blackouts close a suppression interval, so the surface
//! enqueues that interval for backfill.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use veil_core::blackout::{
    BlackoutError, BlackoutManager, ExtensionIncrement, SignalBlackout,
};
use veil_core::config::PartnerConfig;
use veil_core::principal::PartnerPrincipal;

use crate::clock::now_ns;
use crate::state::{chunk_interval, FillRequest};

/// Conflict retries before giving up.
const MAX_CONFLICT_RETRIES: u32 = 3;

/// Base delay between conflict retries.
const RETRY_BASE: Duration = Duration::from_millis(50);

/// Errors returned to partner callers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PartnerRequestError {
    /// The request exceeded its time bound. The blackout is either
    /// unchanged or fully transitioned, never partial.
    #[error("request timed out")]
    Timeout,

    /// The request task failed to complete.
    #[error("request task failed")]
    TaskFailed,

    /// A blackout-level failure.
    #[error(transparent)]
    Blackout(#[from] BlackoutError),
}

/// Partner-facing blackout transition surface.
pub struct PartnerSurface {
    blackouts: Arc<BlackoutManager>,
    backfill_tx: mpsc::Sender<FillRequest>,
    request_timeout: Duration,
}

impl PartnerSurface {
    /// Creates the surface.
    #[must_use]
    pub fn new(
        blackouts: Arc<BlackoutManager>,
        backfill_tx: mpsc::Sender<FillRequest>,
        config: &PartnerConfig,
    ) -> Self {
        Self {
            blackouts,
            backfill_tx,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Extends an active blackout by a fixed increment.
    ///
    /// # Errors
    ///
    /// Returns [`PartnerRequestError::Timeout`] past the request bound, or
    /// the underlying blackout error.
    pub async fn extend(
        &self,
        partner: &PartnerPrincipal,
        signal_id: &str,
        increment: ExtensionIncrement,
        reason: &str,
    ) -> Result<SignalBlackout, PartnerRequestError> {
        timeout(
            self.request_timeout,
            self.extend_with_retry(partner.clone(), signal_id.to_string(), increment, reason.to_string()),
        )
        .await
        .map_err(|_| PartnerRequestError::Timeout)?
    }

    /// Releases an active blackout early and schedules backfill for the
    /// suppressed interval.
    ///
    /// Returns `true` if this call performed the release, `false` for an
    /// idempotent no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PartnerRequestError::Timeout`] past the request bound, or
    /// the underlying blackout error.
    pub async fn release(
        &self,
        partner: &PartnerPrincipal,
        signal_id: &str,
        reason: &str,
    ) -> Result<bool, PartnerRequestError> {
        let blackouts = Arc::clone(&self.blackouts);
        let partner = partner.clone();
        let signal = signal_id.to_string();
        let reason = reason.to_string();

        let released = timeout(
            self.request_timeout,
            tokio::task::spawn_blocking(move || {
                blackouts.release(&signal, &partner, &reason, now_ns())
            }),
        )
        .await
        .map_err(|_| PartnerRequestError::Timeout)?
        .map_err(|_| PartnerRequestError::TaskFailed)??;

        match released {
            Some(blackout) => {
                // The suppression hole runs from signal creation to the
                // release instant.
                for request in
                    chunk_interval(&blackout.subject_id, blackout.started_at_ns, now_ns())
                {
                    if self.backfill_tx.send(request).await.is_err() {
                        tracing::warn!("backfill queue closed during release");
                        break;
                    }
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Seals a rejection record for a caller that failed partner
    /// verification and returns the error to hand back.
    #[must_use]
    pub fn reject_unverified(&self, principal_display: &str, signal_id: &str) -> PartnerRequestError {
        PartnerRequestError::Blackout(self.blackouts.reject_unauthorized(
            principal_display,
            signal_id,
            now_ns(),
        ))
    }

    async fn extend_with_retry(
        &self,
        partner: PartnerPrincipal,
        signal_id: String,
        increment: ExtensionIncrement,
        reason: String,
    ) -> Result<SignalBlackout, PartnerRequestError> {
        let mut attempt = 0u32;
        loop {
            let blackouts = Arc::clone(&self.blackouts);
            let partner = partner.clone();
            let signal = signal_id.clone();
            let reason = reason.clone();

            let result = tokio::task::spawn_blocking(move || {
                blackouts.extend(&signal, &partner, increment, &reason, now_ns())
            })
            .await
            .map_err(|_| PartnerRequestError::TaskFailed)?;

            match result {
                Err(BlackoutError::Conflict { .. }) if attempt < MAX_CONFLICT_RETRIES => {
                    attempt += 1;
                    tokio::time::sleep(RETRY_BASE * attempt).await;
                }
                other => return Ok(other?),
            }
        }
    }
}
