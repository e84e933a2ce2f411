//! Black-box indistinguishability of the suppression chokepoint.
//!
//! These tests use only the public API, the way a capture pipeline would,
//! and assert that nothing observable distinguishes why a moment was
//! suppressed.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use veil_core::allowlist::{AllowlistMatcher, ProtectedResourceEntry, ResourceCategory};
use veil_core::audit::SealedAuditLog;
use veil_core::blackout::BlackoutManager;
use veil_core::config::{BlackoutConfig, ScheduleConfig};
use veil_core::schedule::{FixedSaltProvider, GapScheduler};
use veil_core::store::{FamilyStore, SealedStore};
use veil_core::{AllowlistHandle, SubjectContext, SuppressionEngine};

struct Stack {
    engine: SuppressionEngine,
    scheduler: Arc<GapScheduler>,
    blackouts: Arc<BlackoutManager>,
    family: Arc<FamilyStore>,
}

fn stack() -> Stack {
    let matcher = AllowlistMatcher::from_entries(&[ProtectedResourceEntry {
        domain: "rainn.org".to_string(),
        category: ResourceCategory::CrisisSupport,
    }]);
    let allowlist = AllowlistHandle::new(matcher);
    let scheduler = Arc::new(GapScheduler::new(
        ScheduleConfig::default(),
        Box::new(FixedSaltProvider([3u8; 32])),
    ));
    let sealed = Arc::new(SealedStore::in_memory().expect("open sealed"));
    let audit = Arc::new(SealedAuditLog::open(Arc::clone(&sealed)).expect("open log"));
    let blackouts = Arc::new(
        BlackoutManager::open(sealed, audit, &BlackoutConfig::default()).expect("open manager"),
    );
    let family = Arc::new(FamilyStore::in_memory().expect("open family"));

    Stack {
        engine: SuppressionEngine::new(allowlist, Arc::clone(&scheduler), Arc::clone(&blackouts)),
        scheduler,
        blackouts,
        family,
    }
}

fn quiet_minute(scheduler: &GapScheduler, subject: &str) -> u16 {
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let schedule = scheduler.schedule_for(subject, date).expect("schedule");
    (7 * 60..22 * 60)
        .find(|m| !schedule.covers_minute(*m))
        .expect("waking range is not fully covered")
}

fn gap_minute(scheduler: &GapScheduler, subject: &str) -> u16 {
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let schedule = scheduler.schedule_for(subject, date).expect("schedule");
    schedule.windows[0].start_minute
}

fn at(minute: u16) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, u32::from(minute) / 60, u32::from(minute) % 60, 0)
        .unwrap()
}

#[test]
fn the_three_suppression_paths_are_observably_identical() {
    let stack = stack();
    let ctx = SubjectContext::new("child-42", 0);
    let quiet = quiet_minute(&stack.scheduler, "child-42");
    let gap = gap_minute(&stack.scheduler, "child-42");

    // Crisis visit at a quiet minute.
    let crisis = stack.engine.should_suppress(&ctx, at(quiet), "https://rainn.org/chat");
    // Ordinary site inside a scheduled gap.
    let in_gap = stack.engine.should_suppress(&ctx, at(gap), "https://news.example.com");

    // Ordinary site under an active blackout at a quiet minute.
    let quiet_ns = u64::try_from(at(quiet).timestamp_nanos_opt().unwrap()).unwrap();
    stack
        .blackouts
        .open_blackout("child-42", "signal-1", "core.signal", quiet_ns - 1)
        .expect("open blackout");
    let in_blackout = stack
        .engine
        .should_suppress(&ctx, at(quiet), "https://news.example.com");

    // Identical type, identical value; no metadata accompanies any of them.
    assert!(crisis && in_gap && in_blackout);
}

#[test]
fn suppression_decisions_never_touch_the_family_store() {
    let stack = stack();
    let ctx = SubjectContext::new("child-42", 0);
    let quiet = quiet_minute(&stack.scheduler, "child-42");
    let gap = gap_minute(&stack.scheduler, "child-42");

    // Exercise every branch, including fail-toward-suppression inputs.
    let _ = stack.engine.should_suppress(&ctx, at(quiet), "https://rainn.org");
    let _ = stack.engine.should_suppress(&ctx, at(gap), "https://example.com");
    let _ = stack.engine.should_suppress(&ctx, at(quiet), "https://example.com");
    let _ = stack.engine.should_suppress(&ctx, at(quiet), "");

    // The family domain saw nothing: no rows, no decision residue.
    assert_eq!(
        stack
            .family
            .count_in_interval("child-42", 0, i64::MAX as u64)
            .expect("count"),
        0
    );
}

#[test]
fn capture_simulation_leaves_only_allowed_moments_in_the_timeline() {
    let stack = stack();
    let ctx = SubjectContext::new("child-42", 0);

    // A day of minute-by-minute captures over a mixed URL stream. The
    // pipeline persists only when the engine allows, as the contract
    // requires (skip entirely, never capture-then-hide).
    let urls = [
        "https://school.example.com/classes",
        "https://rainn.org/get-help",
        "https://games.example.com/play",
    ];
    let mut persisted = 0u64;
    for minute in (7 * 60)..(22 * 60) {
        let url = urls[usize::from(minute) % urls.len()];
        let moment = at(minute);
        if !stack.engine.should_suppress(&ctx, moment, url) {
            let ns = u64::try_from(moment.timestamp_nanos_opt().unwrap()).unwrap();
            stack
                .family
                .insert_activity(&veil_core::store::ActivityEntry {
                    id: format!("cap-{minute}"),
                    subject_id: "child-42".to_string(),
                    timestamp_ns: ns,
                    kind: "page_visit".to_string(),
                    metadata: "{}".to_string(),
                })
                .expect("insert");
            persisted += 1;
        }
    }

    // Crisis URLs never persisted.
    let all = stack
        .family
        .timeline("child-42", 0, i64::MAX as u64, 10_000)
        .expect("timeline");
    assert_eq!(all.len() as u64, persisted);
    assert!(persisted > 0);

    // Nothing in the persisted rows betrays the suppressed minutes: every
    // row has the same shape and vocabulary as any other.
    for row in &all {
        assert_eq!(row.kind, "page_visit");
        assert_eq!(row.metadata, "{}");
    }
}
