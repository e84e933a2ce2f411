//! veil-core - Zero-Leakage Protection Core
//!
//! Domain logic for a monitoring system that must protect the monitored:
//! when a subject reaches for a crisis resource or triggers a distress
//! signal, that fact has to be indistinguishable — to anyone reading the
//! family's view — from the ordinary, randomly scheduled gaps every
//! subject's data already has.
//!
//! # Adversary Model
//!
//! The adversary is a guardian with full read access to everything the
//! family-visible domain stores, plus knowledge of how this system works.
//! Three properties hold against that adversary:
//!
//! - **Branch opacity**: the capture pipeline receives a bare `bool` from
//!   [`decision::SuppressionEngine`]; crisis suppression, camouflage gaps,
//!   and blackout suppression are observably identical.
//! - **Negative-inference resistance**: gaps are either filled by
//!   [`backfill::SyntheticBackfillEngine`] to the subject's own baseline
//!   density or left as the kind of empty the subject's baseline predicts;
//!   absence of data is never itself a signal.
//! - **Domain isolation**: the sealed domain ([`store::SealedStore`],
//!   [`audit::SealedAuditLog`], blackout state) shares no database, index,
//!   or reference with the family domain ([`store::FamilyStore`]); the
//!   boundary is enforced with disjoint client types, not access rules.
//!
//! # Modules
//!
//! - [`allowlist`]: protected-resource URL matching with shortener
//!   over-blocking
//! - [`schedule`]: deterministic, salt-keyed daily gap schedules
//! - [`decision`]: the synchronous suppression chokepoint
//! - [`blackout`]: signal-blackout lifecycle and the active index
//! - [`backfill`]: synthetic timeline backfill from historical patterns
//! - [`audit`]: hash-chained, append-only sealed audit log
//! - [`store`]: the two isolated storage clients
//! - [`principal`]: type-level family / partner / compliance credentials
//! - [`config`]: TOML configuration with validation
//! - [`subject`]: per-call subject context

pub mod allowlist;
pub mod audit;
pub mod backfill;
pub mod blackout;
pub mod config;
pub mod decision;
pub mod principal;
pub mod schedule;
pub mod store;
pub mod subject;

pub use allowlist::{AllowlistHandle, AllowlistMatcher};
pub use audit::SealedAuditLog;
pub use backfill::SyntheticBackfillEngine;
pub use blackout::BlackoutManager;
pub use config::CoreConfig;
pub use decision::SuppressionEngine;
pub use schedule::GapScheduler;
pub use store::{FamilyStore, SealedStore};
pub use subject::SubjectContext;
