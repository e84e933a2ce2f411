//! Blackout expiry sweep worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::clock::now_ns;
use crate::state::DaemonState;

/// Runs the sweep loop until shutdown.
///
/// Moves passed-deadline blackouts to expired and enqueues each one's
/// suppression interval for backfill, chunked hourly. The sweep is
/// idempotent and races safely with partner releases: the conditional
/// transition in the sealed store lets exactly one side win.
pub async fn run(state: Arc<DaemonState>, mut shutdown: watch::Receiver<bool>) {
    let sweep_interval = Duration::from_secs(state.config.blackout.sweep_interval_secs);
    let mut interval = tokio::time::interval(sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweep_once(&state).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("expiry sweep worker shutting down");
                    return;
                }
            }
        }
    }
}

async fn sweep_once(state: &DaemonState) {
    let now = now_ns();
    let blackouts = Arc::clone(&state.blackouts);
    let expired = match tokio::task::spawn_blocking(move || blackouts.sweep_expired(now)).await {
        Ok(Ok(expired)) => expired,
        Ok(Err(err)) => {
            warn!(error = %err, "expiry sweep failed");
            return;
        }
        Err(err) => {
            warn!(error = %err, "expiry sweep task failed");
            return;
        }
    };

    for blackout in expired {
        debug!(subject = %blackout.subject_id, "blackout expired; scheduling backfill");
        state
            .enqueue_gap(
                &blackout.subject_id,
                blackout.started_at_ns,
                blackout.expires_at_ns,
            )
            .await;
    }
}
