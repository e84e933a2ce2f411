//! Tests for the blackout lifecycle.

use std::sync::Arc;

use super::*;
use crate::audit::{actions, AuditFilter, SealedAuditLog};
use crate::config::BlackoutConfig;
use crate::principal::{CompliancePrincipal, PartnerPrincipal};
use crate::store::SealedStore;

const HOUR_NS: u64 = 3_600 * 1_000_000_000;
const T0: u64 = 1_000_000 * HOUR_NS;

fn manager() -> (BlackoutManager, Arc<SealedStore>, Arc<SealedAuditLog>) {
    let store = Arc::new(SealedStore::in_memory().expect("open store"));
    let audit = Arc::new(SealedAuditLog::open(Arc::clone(&store)).expect("open log"));
    let manager = BlackoutManager::open(
        Arc::clone(&store),
        Arc::clone(&audit),
        &BlackoutConfig::default(),
    )
    .expect("open manager");
    (manager, store, audit)
}

fn partner() -> PartnerPrincipal {
    PartnerPrincipal::new("crisis-line")
}

#[test]
fn open_sets_48h_deadline_and_marks_subject_active() {
    let (manager, _store, _audit) = manager();

    let blackout = manager
        .open_blackout("child-42", "signal-1", "core.signal", T0)
        .expect("open");

    assert_eq!(blackout.status, BlackoutStatus::Active);
    assert_eq!(blackout.expires_at_ns, T0 + 48 * HOUR_NS);
    assert!(manager.active_for("child-42", T0));
    assert!(manager.active_for("child-42", T0 + 47 * HOUR_NS));
    assert!(!manager.active_for("child-42", T0 + 48 * HOUR_NS));
    assert!(!manager.active_for("other-subject", T0));
}

#[test]
fn duplicate_signal_is_rejected() {
    let (manager, _store, _audit) = manager();
    manager
        .open_blackout("child-42", "signal-1", "core.signal", T0)
        .expect("open");

    let err = manager
        .open_blackout("child-42", "signal-1", "core.signal", T0 + 1)
        .expect_err("second open for same signal must fail");
    assert!(matches!(err, BlackoutError::AlreadyExists { .. }));
}

#[test]
fn extensions_accumulate_and_strictly_increase_deadline() {
    let (manager, _store, _audit) = manager();
    manager
        .open_blackout("child-42", "signal-1", "core.signal", T0)
        .expect("open");

    let extended = manager
        .extend(
            "signal-1",
            &partner(),
            ExtensionIncrement::Hours24,
            "safety plan in progress",
            T0 + HOUR_NS,
        )
        .expect("first extend");
    assert_eq!(extended.expires_at_ns, T0 + 72 * HOUR_NS);
    assert_eq!(extended.extensions.len(), 1);
    assert_eq!(extended.extensions[0].additional_hours, 24);

    // A second extend while still active succeeds and extends further.
    let extended = manager
        .extend(
            "signal-1",
            &partner(),
            ExtensionIncrement::Hours48,
            "continued engagement",
            T0 + 2 * HOUR_NS,
        )
        .expect("second extend");
    assert_eq!(extended.expires_at_ns, T0 + 120 * HOUR_NS);
    assert_eq!(extended.extensions.len(), 2);

    assert!(manager.active_for("child-42", T0 + 100 * HOUR_NS));
}

#[test]
fn extend_after_natural_expiry_is_rejected() {
    let (manager, _store, _audit) = manager();
    manager
        .open_blackout("child-42", "signal-1", "core.signal", T0)
        .expect("open");

    // Past the deadline, even though no sweep has run yet.
    let err = manager
        .extend(
            "signal-1",
            &partner(),
            ExtensionIncrement::Hours24,
            "too late",
            T0 + 49 * HOUR_NS,
        )
        .expect_err("extend past deadline must fail");
    assert!(matches!(err, BlackoutError::AlreadyTerminal { .. }));

    // The lazy expiry stuck.
    let stored = manager
        .extend(
            "signal-1",
            &partner(),
            ExtensionIncrement::Hours24,
            "still too late",
            T0 + 50 * HOUR_NS,
        )
        .expect_err("blackout is terminal now");
    assert!(matches!(stored, BlackoutError::AlreadyTerminal { .. }));
}

#[test]
fn release_is_idempotent() {
    let (manager, _store, _audit) = manager();
    manager
        .open_blackout("child-42", "signal-1", "core.signal", T0)
        .expect("open");

    let released = manager
        .release("signal-1", &partner(), "plan complete", T0 + HOUR_NS)
        .expect("release");
    assert!(released.is_some(), "first release transitions");
    assert!(!manager.active_for("child-42", T0 + HOUR_NS));

    // Double release is a no-op, not an error.
    let again = manager
        .release("signal-1", &partner(), "again", T0 + 2 * HOUR_NS)
        .expect("double release is a no-op");
    assert!(again.is_none());

    // Extend after release is an error though.
    let err = manager
        .extend(
            "signal-1",
            &partner(),
            ExtensionIncrement::Hours24,
            "no",
            T0 + 3 * HOUR_NS,
        )
        .expect_err("extend after release must fail");
    assert!(matches!(err, BlackoutError::AlreadyTerminal { .. }));
}

#[test]
fn unknown_signal_is_not_found() {
    let (manager, _store, _audit) = manager();
    let err = manager
        .extend(
            "signal-missing",
            &partner(),
            ExtensionIncrement::Hours24,
            "x",
            T0,
        )
        .expect_err("unknown signal");
    assert!(matches!(err, BlackoutError::NotFound { .. }));
}

#[test]
fn sweep_expires_passed_deadlines_and_is_idempotent() {
    let (manager, _store, _audit) = manager();
    manager
        .open_blackout("child-1", "signal-1", "core.signal", T0)
        .expect("open");
    manager
        .open_blackout("child-2", "signal-2", "core.signal", T0 + 10 * HOUR_NS)
        .expect("open");

    let expired = manager
        .sweep_expired(T0 + 49 * HOUR_NS)
        .expect("sweep");
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].signal_id, "signal-1");
    assert!(!manager.active_for("child-1", T0 + 49 * HOUR_NS));
    assert!(manager.active_for("child-2", T0 + 49 * HOUR_NS));

    let again = manager
        .sweep_expired(T0 + 49 * HOUR_NS)
        .expect("second sweep");
    assert!(again.is_empty(), "sweep must be idempotent");
}

#[test]
fn every_transition_writes_a_sealed_audit_entry() {
    let (manager, _store, audit) = manager();
    manager
        .open_blackout("child-42", "signal-1", "core.signal", T0)
        .expect("open");
    manager
        .extend(
            "signal-1",
            &partner(),
            ExtensionIncrement::Hours24,
            "r",
            T0 + HOUR_NS,
        )
        .expect("extend");
    manager
        .release("signal-1", &partner(), "done", T0 + 2 * HOUR_NS)
        .expect("release");

    let reviewer = CompliancePrincipal::new("reviewer-1");
    let entries = audit
        .query(
            &reviewer,
            &AuditFilter {
                action_prefix: Some("blackout.".to_string()),
                limit: 10,
                ..AuditFilter::default()
            },
        )
        .expect("query");

    let actions_seen: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(
        actions_seen,
        vec![
            actions::BLACKOUT_OPENED,
            actions::BLACKOUT_EXTENDED,
            actions::BLACKOUT_RELEASED,
        ]
    );
}

#[test]
fn index_warms_from_persisted_state() {
    let store = Arc::new(SealedStore::in_memory().expect("open store"));
    let audit = Arc::new(SealedAuditLog::open(Arc::clone(&store)).expect("open log"));
    let manager = BlackoutManager::open(
        Arc::clone(&store),
        Arc::clone(&audit),
        &BlackoutConfig::default(),
    )
    .expect("open manager");
    manager
        .open_blackout("child-42", "signal-1", "core.signal", T0)
        .expect("open");

    // A fresh manager over the same store sees the active blackout.
    let reopened = BlackoutManager::open(store, audit, &BlackoutConfig::default())
        .expect("reopen manager");
    assert!(reopened.active_for("child-42", T0 + HOUR_NS));
}

#[test]
fn rejected_transitions_are_sealed_only() {
    let (manager, _store, audit) = manager();

    let err = manager.reject_unauthorized("guardian:parent-1", "signal-1", T0);
    assert!(matches!(err, BlackoutError::Unauthorized { .. }));

    let reviewer = CompliancePrincipal::new("reviewer-1");
    let entries = audit
        .query(
            &reviewer,
            &AuditFilter {
                action_prefix: Some(actions::BLACKOUT_REJECTED.to_string()),
                limit: 10,
                ..AuditFilter::default()
            },
        )
        .expect("query");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor_id, "guardian:parent-1");
}

#[test]
fn blacked_out_subjects_lists_covered_subjects() {
    let (manager, _store, _audit) = manager();
    manager
        .open_blackout("child-1", "signal-1", "core.signal", T0)
        .expect("open");
    manager
        .open_blackout("child-2", "signal-2", "core.signal", T0)
        .expect("open");
    manager
        .release("signal-2", &partner(), "done", T0 + HOUR_NS)
        .expect("release");

    let subjects = manager.blacked_out_subjects(T0 + 2 * HOUR_NS);
    assert_eq!(subjects, vec!["child-1".to_string()]);
}
