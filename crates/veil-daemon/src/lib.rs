//! veil-daemon - Protection-core runtime
//!
//! Hosts the background half of the protection core: the workers that keep
//! the synchronous decision path's inputs warm (allowlist snapshots, daily
//! gap schedules, the blackout expiry sweep), the backfill queue that fills
//! timeline holes after gaps close, and the three privilege-separated
//! surfaces collaborators call:
//!
//! - [`partner`]: blackout extend/release for verified crisis partners,
//!   with bounded request timeouts
//! - [`compliance`]: sealed-audit reads for compliance reviewers
//! - [`timeline`]: the family-visible activity timeline
//!
//! Notification recipient filtering ([`notify`]) strips a blacked-out
//! subject's guardians from every outgoing notification, whatever the
//! event type.
//!
//! The hot decision path itself lives in `veil-core` and is called by the
//! capture pipeline in-process; nothing here sits on it.

pub mod clock;
pub mod compliance;
pub mod notify;
pub mod partner;
pub mod state;
pub mod timeline;
pub mod workers;

pub use state::{DaemonState, FillRequest, SetupError};
