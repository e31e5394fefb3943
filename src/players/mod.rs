//! # Player registry.
//!
//! Tracks who is in the lobby and who currently holds admin. Bots live in a
//! reserved low id range and are counted but never become full roster
//! members. The registry is the one piece of session state read concurrently
//! (idle watcher, status publishing), so it carries its own lock.

mod registry;

pub use registry::{Player, PlayerRegistry, RosterChange, BOT_ID_CEILING};
