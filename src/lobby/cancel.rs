//! Session cancellation: one primitive, first cause wins.

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{LobbyError, StopReason};

/// Why the session ended.
#[derive(Debug)]
pub(crate) enum EndCause {
    Reason(StopReason),
    Fatal(LobbyError),
}

/// The single cancellation primitive shared by every session task.
///
/// The first recorded cause sticks; later attempts are logged and dropped.
/// `Done` is the one exception: it never overwrites a substantive cause and
/// only lands when nothing else claimed the session first. Every successful
/// record also cancels the token, which unwinds the idle watcher, the
/// process wait, and (via process death and pipe EOF) the scanners.
#[derive(Debug, Default)]
pub(crate) struct CancelCell {
    token: CancellationToken,
    cause: Mutex<Option<EndCause>>,
}

impl CancelCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Records a policy reason. Safe to call from any task, any number of times.
    pub fn cancel(&self, reason: StopReason) {
        let mut cause = self.lock();
        match &*cause {
            None => {
                if reason != StopReason::Done {
                    debug!(reason = reason.as_label(), "session cancelling");
                }
                *cause = Some(EndCause::Reason(reason));
                drop(cause);
                self.token.cancel();
            }
            Some(existing) => {
                if reason != StopReason::Done {
                    warn!(
                        ignored = reason.as_label(),
                        existing = ?existing,
                        "cancel ignored, cause already set"
                    );
                }
            }
        }
    }

    /// Records a fatal error as the terminal cause.
    pub fn fail(&self, err: LobbyError) {
        let mut cause = self.lock();
        match &*cause {
            None => {
                debug!(error = %err, "session failing");
                *cause = Some(EndCause::Fatal(err));
                drop(cause);
                self.token.cancel();
            }
            Some(existing) => {
                warn!(ignored = %err, existing = ?existing, "failure ignored, cause already set");
            }
        }
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    /// Consumes the cause. Called once by the session runner at the end.
    pub fn take(&self) -> Option<EndCause> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<EndCause>> {
        match self.cause.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
