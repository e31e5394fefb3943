//! # Directory-driven control plane.
//!
//! Operators (and peer lobbies) command a running session by touching named
//! files in the control directory: `up`, `down`, `stop`, `restart`, forced
//! variants (`forcedown`, `forcestop`, `forcerestart`), `flag/`-prefixed
//! copies written by tooling, and `peer/` signals from a paired session.
//!
//! Each file maps to one timestamp in [`SpecState`]; the watcher keeps the
//! shared [`ControlSpec`] current and readers take whole-value snapshots, so
//! concurrent reads never observe a half-updated spec.

mod binding;
mod spec;

pub use binding::{watch_spec_dir, SPEC_TICK};
pub use spec::{ControlSpec, SpecState};
