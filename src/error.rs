//! Error and terminal-reason types for the lobby runtime.
//!
//! Three layers, matching how results travel outward:
//!
//! - [`StopReason`]: expected, policy-driven session endings (timeouts,
//!   control-plane commands, disconnection). Not failures: the restart loop
//!   consumes them to decide retry vs. exit.
//! - [`LobbyError`]: fatal errors that end one session (bad configuration,
//!   pipe/file I/O, a crashed worker). Retried by the restart loop up to
//!   `max_fails`.
//! - [`RunError`]: the outermost result of [`Supervisor::run`](crate::Supervisor::run).
//!
//! [`StopReason`] is a closed variant set with an explicit precedence table
//! (see [`SpecState::reason_after`](crate::control::SpecState::reason_after));
//! reasons are compared by value, never by identity.

use thiserror::Error;

/// Expected terminal reasons for one session.
///
/// These are policy outcomes, not failures. The variants that originate from
/// the control plane (`Downed`, `Stopped`, `Restarted`) halt the restart loop;
/// the timeout family is a soft stop that relaunches the worker.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Default reason at shutdown; set only when nothing else claimed the session.
    #[error("lobby done")]
    Done,
    /// No players for longer than the configured idle timeout.
    #[error("lobby idle timeout")]
    IdleTimeout,
    /// Players present but no match for longer than the admin timeout.
    #[error("lobby admin timeout")]
    AdminTimeout,
    /// Session exceeded the configured maximum uptime.
    #[error("lobby timeout")]
    Timeout,
    /// Control plane requested the lobby be taken down.
    #[error("lobby downed")]
    Downed,
    /// Control plane requested a stop.
    #[error("lobby stopped")]
    Stopped,
    /// Control plane requested a restart.
    #[error("lobby restarted")]
    Restarted,
    /// The worker lost (or never created) its network session.
    #[error("lobby disconnected")]
    Disconnected,
}

impl StopReason {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StopReason::Done => "done",
            StopReason::IdleTimeout => "idle_timeout",
            StopReason::AdminTimeout => "admin_timeout",
            StopReason::Timeout => "timeout",
            StopReason::Downed => "downed",
            StopReason::Stopped => "stopped",
            StopReason::Restarted => "restarted",
            StopReason::Disconnected => "disconnected",
        }
    }

    /// True for reasons the restart loop treats as healthy, retryable ends.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            StopReason::Done
                | StopReason::IdleTimeout
                | StopReason::AdminTimeout
                | StopReason::Timeout
        )
    }

    /// True for control-plane reasons that end the restart loop outright.
    pub fn halts_loop(&self) -> bool {
        matches!(
            self,
            StopReason::Downed | StopReason::Stopped | StopReason::Restarted
        )
    }
}

/// Configuration problems detected before any worker is spawned.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("exe unconfigured")]
    ExeUnconfigured,
    #[error("exe not found: {exe}")]
    ExeNotFound { exe: String },
    #[error("session length must be {min} or more")]
    SessionTooShort { min: usize },
    #[error("session length must be {max} or less")]
    SessionTooLong { max: usize },
}

/// Failures raised while driving the directory watcher.
///
/// Setup failures are returned synchronously from
/// [`watch::watch`](crate::watch::watch); post-setup failures are delivered to
/// the consumer as a terminal [`WatchNotice::Error`](crate::watch::WatchNotice).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watch path unconfigured")]
    PathUnconfigured,
    #[error("watch tick unconfigured")]
    TickUnconfigured,
    /// Two routes (symlink and direct, or two symlinks) resolve to the same
    /// directory; watching it twice would double-deliver events.
    #[error("duplicate watch target: {target} via {first} and {second}")]
    DuplicateTarget {
        target: String,
        first: String,
        second: String,
    },
    #[error("notify: {0}")]
    Notify(#[from] notify::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal errors that end one session.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LobbyError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("watch: {0}")]
    Watch(#[from] WatchError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// The worker exited on its own with a failing status.
    #[error("worker exited: {status}")]
    Worker { status: std::process::ExitStatus },
    /// A collector worker failed to persist a match artifact.
    #[error("collector: {0}")]
    Collector(String),
}

impl LobbyError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LobbyError::Config(_) => "config",
            LobbyError::Watch(_) => "watch",
            LobbyError::Io(_) => "io",
            LobbyError::Worker { .. } => "worker_exited",
            LobbyError::Collector(_) => "collector",
        }
    }
}

/// Outermost result of the restart loop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    /// Too many consecutive failed or too-short sessions.
    #[error("lobby max fails: {fails}")]
    MaxFails {
        fails: u32,
        #[source]
        source: Option<LobbyError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_and_halting_reasons_are_disjoint() {
        let all = [
            StopReason::Done,
            StopReason::IdleTimeout,
            StopReason::AdminTimeout,
            StopReason::Timeout,
            StopReason::Downed,
            StopReason::Stopped,
            StopReason::Restarted,
            StopReason::Disconnected,
        ];
        for reason in all {
            assert!(
                !(reason.is_soft() && reason.halts_loop()),
                "{} is both soft and halting",
                reason.as_label()
            );
        }
        assert!(!StopReason::Disconnected.is_soft());
        assert!(!StopReason::Disconnected.halts_loop());
    }
}
