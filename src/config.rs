//! Lobby configuration and validation.
//!
//! [`LobbyConfig`] bundles everything one session needs: the worker command
//! line, the control/status/log directories, and the timeout and retry
//! policies. Validation runs once, in [`Supervisor::new`](crate::Supervisor::new),
//! before any worker is spawned.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const SESSION_MIN_LEN: usize = 1;
pub const SESSION_MAX_LEN: usize = 40;

/// Worst-case observed lobby population; crossing it toggles the `full` status.
pub const DEFAULT_MAX_PLAYERS: u32 = 10;

/// How long a terminated worker gets to exit before being killed.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(15);

/// What to do when the last player leaves a lobby that saw activity.
///
/// The two strategies observed in production deployments:
///
/// - [`IdlePolicy::Timeout`]: mark the lobby idle and let the idle watcher's
///   timeout reclaim it eventually. This is the default.
/// - [`IdlePolicy::Restart`]: count idle transitions; once `max_idles` is
///   reached, cancel the session gracefully so the surrounding process
///   manager relaunches a fresh worker. The restart loop does not relaunch
///   in-process under this policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdlePolicy {
    Timeout,
    Restart { max_idles: u32 },
}

impl Default for IdlePolicy {
    fn default() -> Self {
        IdlePolicy::Timeout
    }
}

/// Configuration for one supervised lobby.
#[derive(Clone, Debug)]
pub struct LobbyConfig {
    /// Worker command line, comma-separated: executable first, then any
    /// extra arguments. The executable is resolved against `PATH`.
    pub exe: String,
    /// Room name; doubles as the session identity embedded in match ids.
    pub session: String,
    /// Optional room password.
    pub password: String,
    /// Comma-separated bind-address triple; the first field becomes the
    /// worker's `--bind-address`, all three feed the preload companion.
    pub listen: String,

    /// Where match and state artifacts land. `None` disables collection.
    pub log_dir: Option<PathBuf>,
    /// Control directory watched for command files. `None` disables the
    /// control plane.
    pub spec_dir: Option<PathBuf>,
    /// Status directory mirroring live session facts. `None` keeps the
    /// mirror in memory only.
    pub stat_dir: Option<PathBuf>,

    /// Idle timeout: cancel after this long with no players. `None` disables.
    pub timeout: Option<Duration>,
    /// Admin timeout: cancel after this long with players but no match.
    /// `None` disables.
    pub admin_timeout: Option<Duration>,
    /// Minimum uptime before a control-plane stop is honored.
    pub min_uptime: Duration,
    /// Hard ceiling on session uptime. `None` disables.
    pub max_uptime: Option<Duration>,

    /// Consecutive failed (or too-short) sessions tolerated before the
    /// restart loop gives up.
    pub max_fails: u32,
    /// Player capacity used for the `full` status transitions.
    pub max_players: u32,
    pub idle_policy: IdlePolicy,

    /// Persist finalized matches as gzip artifacts.
    pub log_match: bool,
    /// Also persist anonymized companions.
    pub log_clean: bool,
    /// Persist the state document at session end.
    pub log_state: bool,

    /// Tee raw worker stdout to `<log_dir>/worker.log`.
    pub debug: bool,
    pub grace: Duration,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            exe: String::new(),
            session: String::new(),
            password: String::new(),
            listen: String::new(),
            log_dir: None,
            spec_dir: None,
            stat_dir: None,
            timeout: None,
            admin_timeout: None,
            min_uptime: Duration::ZERO,
            max_uptime: None,
            max_fails: 0,
            max_players: DEFAULT_MAX_PLAYERS,
            idle_policy: IdlePolicy::default(),
            log_match: false,
            log_clean: false,
            log_state: false,
            debug: false,
            grace: DEFAULT_GRACE,
        }
    }
}

impl LobbyConfig {
    /// Checks the invariants that must hold before a worker is spawned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exe.split(',').next().map_or(true, str::is_empty) {
            return Err(ConfigError::ExeUnconfigured);
        }
        if self.session.len() < SESSION_MIN_LEN {
            return Err(ConfigError::SessionTooShort {
                min: SESSION_MIN_LEN,
            });
        }
        if self.session.len() > SESSION_MAX_LEN {
            return Err(ConfigError::SessionTooLong {
                max: SESSION_MAX_LEN,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> LobbyConfig {
        LobbyConfig {
            exe: "worker".into(),
            session: "Test Room".into(),
            ..LobbyConfig::default()
        }
    }

    #[test]
    fn validate_accepts_minimal_config() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_empty_exe() {
        let cfg = LobbyConfig {
            exe: String::new(),
            ..valid()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ExeUnconfigured));
    }

    #[test]
    fn validate_rejects_session_bounds() {
        let cfg = LobbyConfig {
            session: String::new(),
            ..valid()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::SessionTooShort {
                min: SESSION_MIN_LEN
            })
        );

        let cfg = LobbyConfig {
            session: "x".repeat(SESSION_MAX_LEN + 1),
            ..valid()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::SessionTooLong {
                max: SESSION_MAX_LEN
            })
        );
    }
}
