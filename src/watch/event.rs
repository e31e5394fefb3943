//! Watch events and the notices delivered to consumers.

use crate::error::WatchError;

/// What happened to a watched name.
///
/// Creations and modifications are deliberately folded together: consumers
/// re-read the file either way, so the distinction only adds churn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchOp {
    Created,
    Removed,
}

/// One logical event: a name relative to the watched root plus the operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub name: String,
    pub op: WatchOp,
}

impl WatchEvent {
    pub fn created(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: WatchOp::Created,
        }
    }

    pub fn removed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: WatchOp::Removed,
        }
    }
}

/// A pure batch transformer. Returning an empty batch suppresses delivery.
pub type WatchFilter = fn(Vec<WatchEvent>) -> Vec<WatchEvent>;

/// What the consumer callback receives.
#[derive(Debug)]
pub enum WatchNotice {
    /// A filtered, non-empty batch of events.
    Batch(Vec<WatchEvent>),
    /// A terminal watch failure; no further batches will arrive.
    Error(WatchError),
    /// Always the last notice. Lets consumers restore baseline state.
    Closed,
}
