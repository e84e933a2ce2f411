//! Allowlist refresh worker.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, warn};
use veil_core::allowlist::{AllowlistHandle, AllowlistMatcher, AllowlistSource};
use veil_core::audit::{actions, SealedAuditLog};
use veil_core::config::AllowlistConfig;

use crate::clock::now_ns;

/// Runs the refresh loop until shutdown.
///
/// Pulls the feed every `refresh_interval_secs`, swaps a fresh matcher
/// into the shared handle, and tracks degradation: an empty feed or a
/// feed older than the staleness threshold raises a sealed alarm exactly
/// once per degradation episode. Degradation never disables the gap or
/// blackout logic — it only means crisis matching has lost its feed.
pub async fn run(
    allowlist: AllowlistHandle,
    source: Arc<dyn AllowlistSource>,
    audit: Arc<SealedAuditLog>,
    config: AllowlistConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.refresh_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut degraded = false;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                refresh_once(&allowlist, source.as_ref(), &audit, &config, &mut degraded);
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("allowlist refresh worker shutting down");
                    return;
                }
            }
        }
    }
}

fn refresh_once(
    allowlist: &AllowlistHandle,
    source: &dyn AllowlistSource,
    audit: &SealedAuditLog,
    config: &AllowlistConfig,
    degraded: &mut bool,
) {
    let now = now_ns();
    match source.fetch() {
        Ok(entries) => {
            let empty = entries.is_empty();
            allowlist.swap(AllowlistMatcher::from_entries(&entries), now);
            debug!(entries = entries.len(), "allowlist refreshed");

            if empty && !*degraded {
                *degraded = true;
                seal_alarm(audit, now, json!({"entries": 0}));
            } else if !empty && *degraded {
                *degraded = false;
                if let Err(err) = audit.append(
                    actions::ALLOWLIST_REFRESHED,
                    "core.refresh",
                    "-",
                    json!({"entries": entries.len()}),
                    now,
                ) {
                    warn!(error = %err, "failed to seal allowlist recovery");
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "allowlist feed pull failed");
            let stale = match allowlist.fetched_at_ns() {
                Some(fetched) => {
                    now.saturating_sub(fetched) > config.staleness_threshold_secs * 1_000_000_000
                }
                None => true,
            };
            if stale && !*degraded {
                *degraded = true;
                seal_alarm(audit, now, json!({"stale": true}));
            }
        }
    }
}

fn seal_alarm(audit: &SealedAuditLog, now: u64, metadata: serde_json::Value) {
    if let Err(err) = audit.append(actions::ALLOWLIST_DEGRADED, "core.refresh", "-", metadata, now)
    {
        warn!(error = %err, "failed to seal allowlist degradation");
    }
}
