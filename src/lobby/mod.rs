//! # One supervised session.
//!
//! [`Lobby`] drives a single worker from spawn to drained shutdown:
//!
//! ```text
//! Lobby::run_session
//!   ├─► control watch (spec dir) ──► ControlSpec
//!   ├─► WorkerProcess::spawn ──► stdout/stderr pipes
//!   ├─► stdout scanner ──► scan state, PlayerRegistry, MatchCollector
//!   ├─► stderr scanner ──► OutputSink
//!   ├─► idle watcher ──► CancelCell
//!   └─► process wait ─┬─ exit ──► classify, drain, report
//!                     └─ cancel ──► terminate (grace, then kill)
//! ```
//!
//! Every task shares one [`cancel::CancelCell`]; the first recorded cause is
//! the session's terminal reason.

pub(crate) mod activity;
pub(crate) mod cancel;
pub(crate) mod idle;
pub(crate) mod process;
mod runner;
pub(crate) mod sink;
pub(crate) mod status;

pub use runner::Lobby;
pub use sink::OutputSink;
pub use status::StatusPublisher;
