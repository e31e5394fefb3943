//! Cross-task view of scanner activity.
//!
//! The stdout scanner owns the pending match; the idle watcher only needs
//! two facts from it: when the idle clock last reset, and whether a match is
//! in progress. This tracker publishes exactly those, under a narrow lock.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug)]
pub(crate) struct Activity {
    /// Baseline for idle measurement: the last flush, or the active match's
    /// own timestamp.
    pub last_flush: DateTime<Utc>,
    /// True while the pending match has an identifier or a match start was
    /// detected ahead of the first kill event.
    pub match_active: bool,
}

#[derive(Debug)]
pub(crate) struct ActivityTracker {
    inner: Mutex<Activity>,
}

impl ActivityTracker {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(Activity {
                last_flush: now,
                match_active: false,
            }),
        }
    }

    pub fn snapshot(&self) -> Activity {
        *self.lock()
    }

    /// A match identifier appeared; the idle clock pins to its timestamp.
    pub fn begin_match(&self, at: DateTime<Utc>) {
        let mut inner = self.lock();
        inner.last_flush = at;
        inner.match_active = true;
    }

    /// Match start detected without an identifier yet (the alternate
    /// detector); keeps admin timeouts from firing mid-round.
    pub fn mark_active(&self) {
        self.lock().match_active = true;
    }

    /// The pending match flushed (or reset); idle measurement restarts now.
    pub fn end_match(&self, now: DateTime<Utc>) {
        let mut inner = self.lock();
        inner.last_flush = now;
        inner.match_active = false;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Activity> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
