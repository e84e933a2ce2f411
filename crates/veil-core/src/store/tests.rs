//! Tests for the storage isolation boundary.

use tempfile::TempDir;

use super::*;
use crate::blackout::{BlackoutExtension, BlackoutStatus, SignalBlackout};

fn entry(id: &str, subject: &str, timestamp_ns: u64, kind: &str) -> ActivityEntry {
    ActivityEntry {
        id: id.to_string(),
        subject_id: subject.to_string(),
        timestamp_ns,
        kind: kind.to_string(),
        metadata: "{}".to_string(),
    }
}

fn blackout(signal: &str, subject: &str, start: u64, end: u64) -> SignalBlackout {
    SignalBlackout {
        id: format!("b-{signal}"),
        subject_id: subject.to_string(),
        signal_id: signal.to_string(),
        started_at_ns: start,
        expires_at_ns: end,
        extensions: Vec::new(),
        status: BlackoutStatus::Active,
    }
}

#[test]
fn family_timeline_is_ordered_and_bounded() {
    let store = FamilyStore::in_memory().expect("open");
    store.insert_activity(&entry("e3", "s1", 300, "page_visit")).expect("insert");
    store.insert_activity(&entry("e1", "s1", 100, "page_visit")).expect("insert");
    store.insert_activity(&entry("e2", "s1", 200, "search")).expect("insert");
    store.insert_activity(&entry("x1", "s2", 150, "search")).expect("insert");

    let timeline = store.timeline("s1", 100, 300, 10).expect("timeline");
    assert_eq!(
        timeline.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
        vec!["e1", "e2"],
        "range end is exclusive and other subjects are excluded"
    );

    assert_eq!(store.count_in_interval("s1", 0, 1_000).expect("count"), 3);
}

#[test]
fn family_duplicate_insert_is_ignored() {
    let store = FamilyStore::in_memory().expect("open");
    assert!(store.insert_activity(&entry("e1", "s1", 100, "search")).expect("insert"));
    assert!(!store.insert_activity(&entry("e1", "s1", 999, "other")).expect("insert"));

    let timeline = store.timeline("s1", 0, 1_000, 10).expect("timeline");
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].timestamp_ns, 100, "original entry wins");
}

#[test]
fn family_history_buckets_by_utc_hour() {
    let store = FamilyStore::in_memory().expect("open");
    let hour_ns = 3_600_000_000_000u64;
    store.insert_activity(&entry("a", "s1", 14 * hour_ns, "page_visit")).expect("insert");
    store.insert_activity(&entry("b", "s1", 14 * hour_ns + 1, "page_visit")).expect("insert");
    store.insert_activity(&entry("c", "s1", 9 * hour_ns, "search")).expect("insert");

    let samples = store.history_samples("s1", 0, 24 * hour_ns).expect("samples");
    let at_14: u64 = samples
        .iter()
        .filter(|s| s.hour_bucket == 14)
        .map(|s| s.count)
        .sum();
    let at_9: u64 = samples
        .iter()
        .filter(|s| s.hour_bucket == 9)
        .map(|s| s.count)
        .sum();
    assert_eq!(at_14, 2);
    assert_eq!(at_9, 1);
}

#[test]
fn subject_salt_is_stable_and_per_subject() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("sealed.db");

    let first = {
        let store = SealedStore::open(&path).expect("open");
        store.subject_salt("s1").expect("salt")
    };

    // A fresh handle over the same file returns the same salt.
    let store = SealedStore::open(&path).expect("reopen");
    assert_eq!(store.subject_salt("s1").expect("salt"), first);
    assert_ne!(store.subject_salt("s2").expect("salt"), first);
}

#[test]
fn blackout_conditional_transition_enforces_expected_status() {
    let store = SealedStore::in_memory().expect("open");
    assert!(store.insert_blackout(&blackout("sig-1", "s1", 100, 200)).expect("insert"));
    assert!(!store.insert_blackout(&blackout("sig-1", "s1", 100, 200)).expect("insert"));

    // Active -> Released applies once.
    assert!(store
        .transition_blackout("sig-1", BlackoutStatus::Active, BlackoutStatus::Released, None, None)
        .expect("transition"));
    // A competing Active -> Expired now loses.
    assert!(!store
        .transition_blackout("sig-1", BlackoutStatus::Active, BlackoutStatus::Expired, None, None)
        .expect("transition"));

    let stored = store.load_blackout("sig-1").expect("load").expect("exists");
    assert_eq!(stored.status, BlackoutStatus::Released);
}

#[test]
fn extension_rides_in_the_transition_transaction() {
    let store = SealedStore::in_memory().expect("open");
    store.insert_blackout(&blackout("sig-1", "s1", 100, 200)).expect("insert");

    let ext = BlackoutExtension {
        extended_by: "crisis-line".to_string(),
        extended_at_ns: 150,
        additional_hours: 24,
        reason: "ongoing".to_string(),
    };
    assert!(store
        .transition_blackout(
            "sig-1",
            BlackoutStatus::Active,
            BlackoutStatus::Active,
            Some(300),
            Some(&ext),
        )
        .expect("transition"));

    let stored = store.load_blackout("sig-1").expect("load").expect("exists");
    assert_eq!(stored.expires_at_ns, 300);
    assert_eq!(stored.extensions, vec![ext.clone()]);

    // A losing transition writes neither the status nor the extension.
    assert!(!store
        .transition_blackout(
            "sig-1",
            BlackoutStatus::Released,
            BlackoutStatus::Active,
            Some(999),
            Some(&ext),
        )
        .expect("transition"));
    let stored = store.load_blackout("sig-1").expect("load").expect("exists");
    assert_eq!(stored.expires_at_ns, 300);
    assert_eq!(stored.extensions.len(), 1);
}

#[test]
fn active_blackouts_lists_only_active() {
    let store = SealedStore::in_memory().expect("open");
    store.insert_blackout(&blackout("sig-1", "s1", 100, 200)).expect("insert");
    store.insert_blackout(&blackout("sig-2", "s2", 100, 200)).expect("insert");
    store
        .transition_blackout("sig-2", BlackoutStatus::Active, BlackoutStatus::Expired, None, None)
        .expect("transition");

    let active = store.active_blackouts().expect("list");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].signal_id, "sig-1");
}

#[test]
fn backfill_interval_marking_is_first_writer_wins() {
    let store = SealedStore::in_memory().expect("open");
    assert!(store.mark_interval_filled("s1", 100, 200, 3, 1_000).expect("mark"));
    assert!(!store.mark_interval_filled("s1", 100, 200, 5, 2_000).expect("mark"));
    assert!(store.interval_filled("s1", 100, 200).expect("query"));
    assert!(!store.interval_filled("s1", 100, 300).expect("query"));
}

#[test]
fn family_schema_contains_no_sealed_tables_or_references() {
    // The isolation boundary is type-level first, but the physical schema
    // must match: the family database knows nothing of the sealed domain.
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("family.db");
    let _store = FamilyStore::open(&path).expect("open");

    let raw = rusqlite::Connection::open(&path).expect("raw open");
    let mut stmt = raw
        .prepare("SELECT name FROM sqlite_master WHERE type IN ('table', 'index')")
        .expect("prepare");
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("collect");

    for name in &names {
        for forbidden in ["blackout", "audit", "synthetic", "salt", "seal"] {
            assert!(
                !name.to_lowercase().contains(forbidden),
                "family schema object {name} references the sealed domain"
            );
        }
    }

    // And no activity column carries a cross-domain reference.
    let columns: Vec<String> = raw
        .prepare("SELECT name FROM pragma_table_info('activity_entries')")
        .expect("prepare")
        .query_map([], |row| row.get::<_, String>(0))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("collect");
    assert_eq!(
        columns,
        vec!["id", "subject_id", "timestamp_ns", "kind", "metadata"]
    );
}
