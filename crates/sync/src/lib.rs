//! Command stash/replay and catch-up state transfer.
//!
//! Commands may arrive reordered or duplicated; the synchronizer stashes
//! anything early, applies in strict sequence order under a per-tick cap,
//! and classifies every inbound command before any side effect. The
//! [`CatchUpResponder`] streams applied commands to lagging peers with
//! bounded work per tick.

mod catchup;
mod config;
mod synchronizer;

pub use catchup::CatchUpResponder;
pub use config::SyncConfig;
pub use synchronizer::{ApplyOutcome, CommandDisposition, CommandSynchronizer};
