//! Daily schedule regeneration worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::clock::now_utc;
use crate::state::DaemonState;

/// How often the roster is walked. Regeneration is idempotent, so a
/// frequent walk costs nothing beyond cache lookups.
const WALK_INTERVAL: Duration = Duration::from_secs(900);

/// Runs the regeneration loop until shutdown.
///
/// Walks the subject roster, pre-generating each subject's schedule for
/// its current local date (so first capture of the day never pays the
/// generation cost on the hot path) and evicting schedules whose date has
/// passed. Racing with lazy generation on the decision path is safe: both
/// compute the same deterministic schedule.
pub async fn run(state: Arc<DaemonState>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(WALK_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                walk_roster(&state);
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("schedule regeneration worker shutting down");
                    return;
                }
            }
        }
    }
}

fn walk_roster(state: &DaemonState) {
    let now = now_utc();
    let subjects = state.subjects();
    let mut earliest = None;

    for ctx in &subjects {
        let date = ctx.local_date(now);
        earliest = Some(match earliest {
            None => date,
            Some(prev) if date < prev => date,
            Some(prev) => prev,
        });

        if let Err(err) = state.scheduler.schedule_for(&ctx.subject_id, date) {
            // The decision path fails toward suppression without a
            // schedule; this is worth an operator's attention.
            warn!(error = %err, "schedule generation failed");
        }
    }

    if let Some(earliest) = earliest {
        state.scheduler.evict_expired(earliest);
    }
    debug!(subjects = subjects.len(), "schedule roster walk complete");
}
