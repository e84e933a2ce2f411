//! Backfill queue worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use veil_core::backfill::BackfillOutcome;
use veil_core::SyntheticBackfillEngine;

use crate::clock::now_ns;
use crate::state::FillRequest;

/// Attempts per request before it is dropped with a warning. Until a
/// retry succeeds the interval simply reads as a plain gap family-side.
const MAX_ATTEMPTS: u32 = 5;

/// Runs the backfill drain loop until shutdown.
pub async fn run(
    engine: Arc<SyntheticBackfillEngine>,
    mut queue: mpsc::Receiver<FillRequest>,
    retry_backoff: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            request = queue.recv() => {
                let Some(request) = request else {
                    debug!("backfill queue closed");
                    return;
                };
                fill_with_retry(&engine, request, retry_backoff).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("backfill worker shutting down");
                    return;
                }
            }
        }
    }
}

async fn fill_with_retry(
    engine: &Arc<SyntheticBackfillEngine>,
    request: FillRequest,
    retry_backoff: Duration,
) {
    for attempt in 1..=MAX_ATTEMPTS {
        let engine = Arc::clone(engine);
        let req = request.clone();
        let result = tokio::task::spawn_blocking(move || {
            engine.fill_gap(&req.subject_id, req.gap_start_ns, req.gap_end_ns, now_ns())
        })
        .await;

        match result {
            Ok(Ok(BackfillOutcome::Filled { entry_count })) => {
                debug!(entries = entry_count, "gap filled");
                return;
            }
            Ok(Ok(BackfillOutcome::AlreadyFilled)) => return,
            Ok(Err(err)) => {
                warn!(error = %err, attempt, "backfill attempt failed");
            }
            Err(err) => {
                warn!(error = %err, attempt, "backfill task failed");
            }
        }
        tokio::time::sleep(retry_backoff * attempt).await;
    }
    warn!(
        subject = %request.subject_id,
        "backfill exhausted retries; interval remains an ordinary gap"
    );
}
