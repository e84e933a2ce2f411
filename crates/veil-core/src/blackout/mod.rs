//! Signal-blackout lifecycle management.
//!
//! A blackout begins atomically with a distress signal and suppresses all
//! notifications about its subject until it expires or a partner releases
//! it. Blackouts live only in the sealed domain; the decision engine sees
//! them through an in-memory index kept warm by this module.
//!
//! # State Machine
//!
//! ```text
//! (none) --open--> Active
//! Active --extend--> Active (deadline strictly later)
//! Active --release--> Released
//! Active --sweep/lazy expiry--> Expired
//! ```
//!
//! Extend and release require a partner principal. Release and expiry are
//! idempotent; extend on a terminal blackout is an error. Transitions are
//! linearized through a single transition lock and a conditional update in
//! the sealed store, so a racing extend and expiry sweep cannot both win.
//!
//! Every transition appends a sealed audit entry. Nothing here writes to
//! any family-reachable store.

mod error;
mod manager;
mod state;

#[cfg(test)]
mod tests;

pub use error::BlackoutError;
pub use manager::BlackoutManager;
pub use state::{BlackoutExtension, BlackoutStatus, ExtensionIncrement, SignalBlackout};
