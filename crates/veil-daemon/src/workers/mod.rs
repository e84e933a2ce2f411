//! Background workers.
//!
//! Four cooperative loops, none on the hot decision path:
//!
//! - [`allowlist_refresh`]: pulls the protected-resource feed, swaps the
//!   shared snapshot, and raises sealed staleness alarms
//! - [`schedule_regen`]: pre-generates each subject's daily gap schedule
//!   and evicts expired ones
//! - [`expiry_sweep`]: expires passed-deadline blackouts and enqueues
//!   their intervals for backfill
//! - [`backfill_worker`]: drains the fill queue with retry and backoff
//!
//! Workers shut down when the shared watch channel flips to `true`.

pub mod allowlist_refresh;
pub mod backfill_worker;
pub mod expiry_sweep;
pub mod schedule_regen;
