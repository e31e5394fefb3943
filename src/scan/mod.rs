//! # Log-line protocol scanning.
//!
//! Two tasks consume the worker's stdout and stderr. Lines pass a static
//! ignore filter first; surviving stdout lines are dispatched through an
//! ordered rule table ([`rules`]) that drives the session state machine:
//!
//! ```text
//! Idle ──(player joins)──► Populating ──(match id seen)──► InMatch
//!   ▲                          │                              │
//!   └────────(last player leaves / match flushes)─────────────┘
//! ```
//!
//! Only the stdout task mutates scan state, so no lock guards it; everything
//! other tasks need crosses through `PlayerRegistry`, `ActivityTracker`,
//! `StatusPublisher`, and the cancel cell.

pub(crate) mod ignore;
pub(crate) mod json;
mod lines;
pub(crate) mod rules;
pub(crate) mod scanner;
