//! The storage isolation boundary.
//!
//! Two storage-client types over two physically separate `SQLite` databases:
//!
//! - [`FamilyStore`] — the family-reachable activity timeline. Its method
//!   set can express queries over activity entries and nothing else.
//! - [`SealedStore`] — blackouts, sealed audit entries, synthetic companion
//!   tags, and subject salts. Only constructed by the protection core and
//!   the compliance surface.
//!
//! The boundary is type-level: there is no trait the two stores share, no
//! method on [`FamilyStore`] that names a sealed table, and no column in the
//! family schema that references a sealed row. Reaching sealed data with a
//! family-scoped handle is a compile error, not a code-review catch.
//!
//! Both stores use WAL mode for concurrent reads, with schemas embedded at
//! compile time.

mod family;
mod sealed;

#[cfg(test)]
mod tests;

use thiserror::Error;

pub use family::{ActivityEntry, FamilyStore, HistorySample};
pub use sealed::SealedStore;

/// Errors from either storage domain.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error during database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be decoded.
    #[error("corrupt stored value in {table}: {details}")]
    Corrupt {
        /// Table the value came from.
        table: &'static str,
        /// What was wrong.
        details: String,
    },
}
