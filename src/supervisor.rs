//! # The outer restart loop.
//!
//! Drives one session to completion at a time and decides relaunch vs. exit:
//!
//! ```text
//! loop {
//!   ├─► control files say down/stop/restart? ─► exit with that reason
//!   ├─► run one session
//!   ├─► Downed/Stopped/Restarted ─► exit with that reason
//!   ├─► soft reason, healthy uptime ─► fails = 0, relaunch
//!   ├─► soft reason, under the floor ─► fails += 1, sleep out the floor
//!   └─► failure ─► fails += 1, relaunch immediately
//!         └─► fails reaches max_fails ─► RunError::MaxFails
//! }
//! ```
//!
//! Sessions that end faster than [`RETRY_FLOOR`] count as failures whatever
//! their reported reason; that is what catches crash loops that exit
//! "cleanly" but immediately. The floor sleep and the sessions themselves
//! both honor the externally supplied shutdown token.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{IdlePolicy, LobbyConfig};
use crate::error::{ConfigError, LobbyError, RunError, StopReason};
use crate::lobby::{Lobby, OutputSink};

/// Minimum healthy session uptime; also the relaunch backoff budget.
pub const RETRY_FLOOR: Duration = Duration::from_secs(15);

/// How one session ended.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Policy reason on success, fatal error otherwise.
    pub result: Result<StopReason, LobbyError>,
    /// Zero when the worker never started.
    pub uptime: Duration,
}

/// One supervised session, start to finish.
///
/// [`Lobby`] is the production implementation; tests script their own.
#[async_trait]
pub trait SessionRunner: Send + Sync {
    async fn run_session(&self, shutdown: CancellationToken) -> SessionOutcome;
}

/// Runs sessions until policy says stop.
pub struct Supervisor<R> {
    cfg: LobbyConfig,
    runner: R,
}

impl Supervisor<Lobby> {
    /// The standard wiring: validated config driving a [`Lobby`].
    pub fn with_lobby(cfg: LobbyConfig, sink: OutputSink) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let runner = Lobby::new(cfg.clone(), sink);
        Ok(Self { cfg, runner })
    }
}

impl<R: SessionRunner> Supervisor<R> {
    pub fn new(cfg: LobbyConfig, runner: R) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self { cfg, runner })
    }

    /// The restart loop. Returns the final policy reason, or an error once
    /// configuration or the fail budget gives out.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<StopReason, RunError> {
        let started = Utc::now();
        let mut runs: u32 = 0;
        let mut fails: u32 = 0;
        let mut last = StopReason::Done;
        while !shutdown.is_cancelled() {
            if let Some(reason) = self.pending_halt(started, runs) {
                info!(reason = reason.as_label(), runs, "halting before launch");
                return Ok(reason);
            }
            runs += 1;
            let outcome = self.runner.run_session(shutdown.child_token()).await;
            match outcome.result {
                Ok(reason) if reason.halts_loop() => {
                    info!(reason = reason.as_label(), runs, "control plane ended the loop");
                    return Ok(reason);
                }
                Ok(reason) => {
                    last = reason;
                    if let IdlePolicy::Restart { .. } = self.cfg.idle_policy {
                        // The surrounding process manager owns the relaunch.
                        return Ok(reason);
                    }
                    if outcome.uptime >= RETRY_FLOOR {
                        fails = 0;
                        continue;
                    }
                    // Ended too soon; counts against the budget no matter
                    // how clean the reason looked.
                    fails += 1;
                    if fails >= self.cfg.max_fails {
                        return Err(RunError::MaxFails {
                            fails,
                            source: None,
                        });
                    }
                    let remaining = RETRY_FLOOR - outcome.uptime;
                    debug!(remaining = ?remaining, runs, fails, "short session, sleeping");
                    tokio::select! {
                        _ = tokio::time::sleep(remaining) => {}
                        _ = shutdown.cancelled() => return Ok(last),
                    }
                }
                Err(err) => {
                    fails += 1;
                    error!(error = %err, runs, fails, "session failed");
                    if fails >= self.cfg.max_fails {
                        return Err(RunError::MaxFails {
                            fails,
                            source: Some(err),
                        });
                    }
                    // Fast retry for transient failures.
                }
            }
        }
        Ok(last)
    }

    /// Non-forced control flags consulted between runs. Stop and restart
    /// only apply once at least one run has completed; a stale marker from
    /// before this supervisor started is already consumed.
    fn pending_halt(&self, started: DateTime<Utc>, runs: u32) -> Option<StopReason> {
        let dir = self.cfg.spec_dir.as_deref()?;
        if dir.join("down").exists() {
            return Some(StopReason::Downed);
        }
        if runs != 0 {
            if modified_after(&dir.join("stop"), started) {
                return Some(StopReason::Stopped);
            }
            if modified_after(&dir.join("restart"), started) {
                return Some(StopReason::Restarted);
            }
        }
        None
    }
}

fn modified_after(path: &Path, after: DateTime<Utc>) -> bool {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(|at| DateTime::<Utc>::from(at))
        .map_or(false, |at| at > after)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;

    struct Scripted {
        outcomes: Mutex<VecDeque<SessionOutcome>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(outcomes: Vec<SessionOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionRunner for Scripted {
        async fn run_session(&self, _shutdown: CancellationToken) -> SessionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .expect("script lock")
                .pop_front()
                .expect("script exhausted")
        }
    }

    fn cfg(max_fails: u32) -> LobbyConfig {
        LobbyConfig {
            exe: "worker".into(),
            session: "Room".into(),
            max_fails,
            ..LobbyConfig::default()
        }
    }

    fn failed() -> SessionOutcome {
        SessionOutcome {
            result: Err(LobbyError::Collector("boom".into())),
            uptime: Duration::from_secs(1),
        }
    }

    fn ended(reason: StopReason, uptime: Duration) -> SessionOutcome {
        SessionOutcome {
            result: Ok(reason),
            uptime,
        }
    }

    #[tokio::test]
    async fn third_consecutive_failure_exhausts_a_budget_of_three() {
        let runner = Scripted::new(vec![failed(), failed(), failed(), failed()]);
        let supervisor = Supervisor::new(cfg(3), runner).expect("config");
        let err = supervisor
            .run(CancellationToken::new())
            .await
            .err()
            .expect("must exhaust");
        assert!(
            matches!(err, RunError::MaxFails { fails: 3, .. }),
            "{err}"
        );
        assert_eq!(supervisor.runner.calls(), 3, "fails on the third, not fourth");
    }

    #[tokio::test]
    async fn control_plane_reasons_end_the_loop_immediately() {
        let runner = Scripted::new(vec![ended(StopReason::Downed, Duration::from_secs(60))]);
        let supervisor = Supervisor::new(cfg(3), runner).expect("config");
        let reason = supervisor
            .run(CancellationToken::new())
            .await
            .expect("policy end");
        assert_eq!(reason, StopReason::Downed);
        assert_eq!(supervisor.runner.calls(), 1);
    }

    #[tokio::test]
    async fn healthy_sessions_reset_the_fail_counter() {
        let runner = Scripted::new(vec![
            failed(),
            ended(StopReason::IdleTimeout, Duration::from_secs(120)),
            failed(),
            failed(),
            ended(StopReason::Stopped, Duration::from_secs(120)),
        ]);
        let supervisor = Supervisor::new(cfg(3), runner).expect("config");
        let reason = supervisor
            .run(CancellationToken::new())
            .await
            .expect("policy end");
        assert_eq!(reason, StopReason::Stopped);
        assert_eq!(supervisor.runner.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn short_clean_sessions_sleep_out_the_floor() {
        let runner = Scripted::new(vec![
            ended(StopReason::Done, Duration::from_secs(1)),
            ended(StopReason::Downed, Duration::from_secs(60)),
        ]);
        let supervisor = Supervisor::new(cfg(5), runner).expect("config");
        let before = tokio::time::Instant::now();
        let reason = supervisor
            .run(CancellationToken::new())
            .await
            .expect("policy end");
        assert_eq!(reason, StopReason::Downed);
        assert_eq!(supervisor.runner.calls(), 2);
        // Slept the remaining 14s of the floor (paused time, auto-advanced).
        assert!(before.elapsed() >= RETRY_FLOOR - Duration::from_secs(1));
    }

    #[tokio::test]
    async fn idle_restart_policy_hands_relaunch_to_the_process_manager() {
        let mut config = cfg(3);
        config.idle_policy = IdlePolicy::Restart { max_idles: 2 };
        let runner = Scripted::new(vec![ended(
            StopReason::IdleTimeout,
            Duration::from_secs(600),
        )]);
        let supervisor = Supervisor::new(config, runner).expect("config");
        let reason = supervisor
            .run(CancellationToken::new())
            .await
            .expect("policy end");
        assert_eq!(reason, StopReason::IdleTimeout);
        assert_eq!(supervisor.runner.calls(), 1);
    }

    #[tokio::test]
    async fn a_down_marker_halts_before_the_first_launch() {
        let spec_dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(spec_dir.path().join("down"), b"\n").expect("write down");
        let mut config = cfg(3);
        config.spec_dir = Some(spec_dir.path().to_path_buf());
        let runner = Scripted::new(vec![]);
        let supervisor = Supervisor::new(config, runner).expect("config");
        let reason = supervisor
            .run(CancellationToken::new())
            .await
            .expect("policy end");
        assert_eq!(reason, StopReason::Downed);
        assert_eq!(supervisor.runner.calls(), 0);
    }

    #[tokio::test]
    async fn a_fresh_stop_marker_halts_after_one_run() {
        let spec_dir = tempfile::tempdir().expect("tempdir");
        let mut config = cfg(3);
        config.spec_dir = Some(spec_dir.path().to_path_buf());
        struct StopWriter {
            dir: std::path::PathBuf,
            calls: AtomicU32,
        }
        #[async_trait]
        impl SessionRunner for StopWriter {
            async fn run_session(&self, _shutdown: CancellationToken) -> SessionOutcome {
                self.calls.fetch_add(1, Ordering::SeqCst);
                std::fs::write(self.dir.join("stop"), b"\n").expect("write stop");
                SessionOutcome {
                    result: Ok(StopReason::IdleTimeout),
                    uptime: Duration::from_secs(60),
                }
            }
        }
        let runner = StopWriter {
            dir: spec_dir.path().to_path_buf(),
            calls: AtomicU32::new(0),
        };
        let supervisor = Supervisor::new(config, runner).expect("config");
        let reason = supervisor
            .run(CancellationToken::new())
            .await
            .expect("policy end");
        assert_eq!(reason, StopReason::Stopped);
        assert_eq!(supervisor.runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_shutdown_runs_nothing() {
        let runner = Scripted::new(vec![]);
        let supervisor = Supervisor::new(cfg(3), runner).expect("config");
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let reason = supervisor.run(shutdown).await.expect("clean");
        assert_eq!(reason, StopReason::Done);
        assert_eq!(supervisor.runner.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_at_construction() {
        let runner = Scripted::new(vec![]);
        let err = Supervisor::new(LobbyConfig::default(), runner)
            .err()
            .expect("must reject");
        assert_eq!(err, ConfigError::ExeUnconfigured);
    }
}
