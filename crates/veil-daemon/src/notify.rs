//! Notification recipient filtering.
//!
//! The dispatch system hands every outgoing notification's recipient list
//! through [`NotificationFilter::filter`] before sending. During an active
//! blackout the subject's guardians are removed from the list for *every*
//! event type — weekly summaries, device alerts, anything — not only
//! signal-related events. A guardian who stops receiving exactly one
//! category of notification could infer what that category means.

use std::sync::Arc;

use veil_core::blackout::BlackoutManager;

/// One notification recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// Receiving principal.
    pub principal_id: String,
    /// The subject this recipient is a guardian of, if any. Non-guardian
    /// recipients (partner staff, compliance) pass through untouched.
    pub guardian_of: Option<String>,
}

impl Recipient {
    /// A guardian recipient for a subject.
    #[must_use]
    pub fn guardian(principal_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            guardian_of: Some(subject_id.into()),
        }
    }

    /// A recipient with no guardian relationship.
    #[must_use]
    pub fn plain(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            guardian_of: None,
        }
    }
}

/// Filters recipient lists against active blackouts.
pub struct NotificationFilter {
    blackouts: Arc<BlackoutManager>,
}

impl NotificationFilter {
    /// Creates a filter over the blackout index.
    #[must_use]
    pub fn new(blackouts: Arc<BlackoutManager>) -> Self {
        Self { blackouts }
    }

    /// Removes guardians of blacked-out subjects from the list.
    ///
    /// Applied to every notification regardless of event type. The
    /// returned list carries no marker of whether anything was removed.
    #[must_use]
    pub fn filter(&self, recipients: Vec<Recipient>, now_ns: u64) -> Vec<Recipient> {
        recipients
            .into_iter()
            .filter(|recipient| match &recipient.guardian_of {
                Some(subject_id) => !self.blackouts.active_for(subject_id, now_ns),
                None => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use veil_core::audit::SealedAuditLog;
    use veil_core::config::BlackoutConfig;
    use veil_core::principal::PartnerPrincipal;
    use veil_core::store::SealedStore;

    use super::*;

    const HOUR_NS: u64 = 3_600 * 1_000_000_000;
    const T0: u64 = 1_000 * HOUR_NS;

    fn filter_with_manager() -> (NotificationFilter, Arc<BlackoutManager>) {
        let store = Arc::new(SealedStore::in_memory().expect("open store"));
        let audit = Arc::new(SealedAuditLog::open(Arc::clone(&store)).expect("open log"));
        let blackouts = Arc::new(
            BlackoutManager::open(store, audit, &BlackoutConfig::default()).expect("open manager"),
        );
        (NotificationFilter::new(Arc::clone(&blackouts)), blackouts)
    }

    #[test]
    fn guardians_of_blacked_out_subjects_are_removed_for_any_event() {
        let (filter, blackouts) = filter_with_manager();
        blackouts
            .open_blackout("child-42", "signal-1", "core.signal", T0)
            .expect("open");

        let recipients = vec![
            Recipient::guardian("parent-1", "child-42"),
            Recipient::guardian("parent-2", "child-42"),
            Recipient::guardian("parent-3", "child-7"),
            Recipient::plain("partner-staff-1"),
        ];

        let filtered = filter.filter(recipients, T0 + HOUR_NS);
        let ids: Vec<&str> = filtered.iter().map(|r| r.principal_id.as_str()).collect();
        assert_eq!(ids, vec!["parent-3", "partner-staff-1"]);
    }

    #[test]
    fn guardians_return_after_release() {
        let (filter, blackouts) = filter_with_manager();
        blackouts
            .open_blackout("child-42", "signal-1", "core.signal", T0)
            .expect("open");
        blackouts
            .release(
                "signal-1",
                &PartnerPrincipal::new("crisis-line"),
                "plan complete",
                T0 + HOUR_NS,
            )
            .expect("release");

        let recipients = vec![Recipient::guardian("parent-1", "child-42")];
        let filtered = filter.filter(recipients.clone(), T0 + 2 * HOUR_NS);
        assert_eq!(filtered, recipients);
    }

    #[test]
    fn empty_and_untouched_lists_pass_through() {
        let (filter, _blackouts) = filter_with_manager();
        assert!(filter.filter(Vec::new(), T0).is_empty());

        let recipients = vec![
            Recipient::guardian("parent-1", "child-42"),
            Recipient::plain("compliance-1"),
        ];
        assert_eq!(filter.filter(recipients.clone(), T0), recipients);
    }
}
