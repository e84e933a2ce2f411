//! Blackout-specific error types.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur during blackout operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BlackoutError {
    /// No blackout exists for this signal.
    #[error("no blackout found for signal {signal_id}")]
    NotFound {
        /// The signal ID that has no blackout.
        signal_id: String,
    },

    /// A blackout already exists for this signal.
    #[error("signal {signal_id} already has a blackout: {blackout_id}")]
    AlreadyExists {
        /// The signal ID.
        signal_id: String,
        /// The existing blackout's ID.
        blackout_id: String,
    },

    /// Attempted a transition on a blackout in a terminal state.
    #[error("blackout for signal {signal_id} is already {current_status}")]
    AlreadyTerminal {
        /// The signal ID.
        signal_id: String,
        /// The terminal status the blackout is in.
        current_status: String,
    },

    /// A competing transition won; the caller should retry.
    #[error("concurrent transition on blackout for signal {signal_id}")]
    Conflict {
        /// The signal ID.
        signal_id: String,
    },

    /// The caller is not authorized for this transition.
    #[error("principal {principal} may not transition blackouts")]
    Unauthorized {
        /// Display form of the rejected principal.
        principal: String,
    },

    /// Unknown status value in storage.
    #[error("invalid blackout status: {value}")]
    InvalidStatus {
        /// The invalid value.
        value: String,
    },

    /// Sealed-store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Sealed-audit failure while recording a transition.
    #[error("failed to record blackout transition: {0}")]
    Audit(#[from] crate::audit::AuditError),
}
