//! # Debounced directory watching.
//!
//! Turns raw filesystem notifications into coalesced, filtered batches of
//! logical events, delivered to a consumer callback:
//!
//! ```text
//!  notify (OS) ──► raw channel ──► delivery task ──► filters ──► handler
//!                                   (debounce)      (pure fns)
//! ```
//!
//! - The initial batch reflects current directory contents as synthetic
//!   `Created` events, delivered synchronously from [`watch`] before any OS
//!   notification, so consumers can be idempotent over restarts.
//! - Raw notifications buffer until a quiet period (the configured tick)
//!   passes with no new events, then flush as one batch.
//! - Subdirectories are watched transparently; symlinks are resolved once at
//!   setup and their targets watched under the logical (link-side) name. Two
//!   routes to the same target are a hard setup error.
//! - Filters are pure batch transformers (see [`filters`]); a filter that
//!   returns an empty batch suppresses delivery entirely.
//! - [`WatchGuard::stop`] closes the OS watch and waits for the delivery
//!   task; no notice arrives after it returns.

mod event;
pub mod filters;
mod watcher;

pub use event::{WatchEvent, WatchFilter, WatchNotice, WatchOp};
pub use watcher::{watch, WatchGuard, WatchOptions};
