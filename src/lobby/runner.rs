//! One supervised session from spawn to drained shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::activity::ActivityTracker;
use super::cancel::{CancelCell, EndCause};
use super::idle;
use super::process::{self, WorkerProcess};
use super::sink::OutputSink;
use super::status::StatusPublisher;
use crate::config::LobbyConfig;
use crate::control::{self, ControlSpec};
use crate::error::{LobbyError, StopReason};
use crate::matches::{CollectorOptions, MatchCollector};
use crate::players::PlayerRegistry;
use crate::scan::scanner::{self, ScanCtx};
use crate::supervisor::{SessionOutcome, SessionRunner};
use crate::watch::WatchGuard;

/// Name of the stdout tee written when debugging; rotated at session end.
const TEE_LOG: &str = "worker.log";
const TEE_LOG_PREV: &str = "worker-prev.log";

/// The production session runner.
pub struct Lobby {
    cfg: Arc<LobbyConfig>,
    sink: Arc<OutputSink>,
}

impl Lobby {
    pub fn new(cfg: LobbyConfig, sink: OutputSink) -> Self {
        Self {
            cfg: Arc::new(cfg),
            sink: Arc::new(sink),
        }
    }

    async fn drive(
        &self,
        shutdown: CancellationToken,
        uptime: &mut Duration,
    ) -> Result<StopReason, LobbyError> {
        let cfg = self.cfg.clone();
        let cancel = Arc::new(CancelCell::new());
        let players = Arc::new(PlayerRegistry::new());
        let spec = Arc::new(ControlSpec::new());
        let status = Arc::new(StatusPublisher::new(cfg.stat_dir.clone()));
        let activity = Arc::new(ActivityTracker::new(Utc::now()));

        // Idempotence over restarts: retire anything a previous run left live.
        status.clear_all();

        let mut spec_guard: Option<WatchGuard> = None;
        if let Some(dir) = &cfg.spec_dir {
            match control::watch_spec_dir(spec.clone(), dir) {
                Ok(guard) => spec_guard = Some(guard),
                Err(err) => return Err(err.into()),
            }
        }

        let worker = match process::spawn(&cfg) {
            Ok(worker) => worker,
            Err(err) => {
                if let Some(guard) = spec_guard {
                    guard.stop().await;
                }
                return Err(err);
            }
        };
        let WorkerProcess {
            mut child,
            stdout,
            stderr,
        } = worker;
        let run_start = Utc::now();
        let started = Instant::now();
        status.mark("up");
        if let Some(dir) = &cfg.spec_dir {
            status.load_spec_state(dir, run_start);
        }

        let tee = match (&cfg.log_dir, cfg.debug) {
            (Some(dir), true) => std::fs::File::create(dir.join(TEE_LOG))
                .map_err(|err| debug!(error = %err, "tee log unavailable"))
                .ok(),
            _ => None,
        };

        let (collector, collector_tasks): (Option<MatchCollector>, Vec<JoinHandle<()>>) =
            match &cfg.log_dir {
                Some(dir) if cfg.log_match || cfg.log_clean => {
                    let (collector, tasks) = MatchCollector::spawn(
                        CollectorOptions {
                            log_dir: dir.clone(),
                            session: cfg.session.clone(),
                            clean: cfg.log_clean,
                        },
                        cancel.clone(),
                    );
                    (Some(collector), tasks)
                }
                _ => (None, Vec::new()),
            };

        let ctx = ScanCtx::new(
            cfg.clone(),
            players.clone(),
            status.clone(),
            spec.clone(),
            activity.clone(),
            cancel.clone(),
            self.sink.clone(),
            collector,
            run_start,
        );
        let stdout_task = tokio::spawn(scanner::run_stdout(ctx, stdout, tee));
        let stderr_task = tokio::spawn(scanner::run_stderr(
            stderr,
            self.sink.clone(),
            cancel.clone(),
        ));
        let idle_task = tokio::spawn(idle::run(
            cfg.clone(),
            spec.clone(),
            players.clone(),
            activity.clone(),
            cancel.clone(),
            run_start,
        ));

        let token = cancel.token();
        let mut shutdown_seen = false;
        let exit = loop {
            tokio::select! {
                code = child.wait() => break code,
                _ = token.cancelled() => {
                    process::terminate(&mut child);
                    break match tokio::time::timeout(cfg.grace, child.wait()).await {
                        Ok(code) => code,
                        Err(_elapsed) => {
                            debug!(grace = ?cfg.grace, "grace exceeded, killing worker");
                            let _ = child.start_kill();
                            child.wait().await
                        }
                    };
                }
                _ = shutdown.cancelled(), if !shutdown_seen => {
                    shutdown_seen = true;
                    cancel.cancel(StopReason::Done);
                }
            }
        };

        status.clear("up");
        *uptime = started.elapsed();
        match exit {
            Ok(code) => {
                debug!(status = %code, "worker exited");
                if !code.success() && !cancel.is_set() {
                    cancel.fail(LobbyError::Worker { status: code });
                }
            }
            Err(err) => {
                if !cancel.is_set() {
                    cancel.fail(LobbyError::Io(err));
                }
            }
        }
        // Default when nothing else claimed the session; also fires the
        // token so the idle watcher unwinds.
        cancel.cancel(StopReason::Done);

        let _ = stdout_task.await;
        let _ = stderr_task.await;
        let _ = idle_task.await;
        for task in collector_tasks {
            let _ = task.await;
        }
        if let Some(guard) = spec_guard {
            guard.stop().await;
        }

        if let Some(dir) = &cfg.log_dir {
            if cfg.debug {
                let _ = std::fs::rename(dir.join(TEE_LOG), dir.join(TEE_LOG_PREV));
            }
            if cfg.log_state {
                status.save_state(dir, &cfg.session);
            }
        }
        status.clear_all();

        match cancel.take() {
            Some(EndCause::Reason(reason)) => Ok(reason),
            Some(EndCause::Fatal(err)) => Err(err),
            None => Ok(StopReason::Done),
        }
    }
}

#[async_trait]
impl SessionRunner for Lobby {
    async fn run_session(&self, shutdown: CancellationToken) -> SessionOutcome {
        let mut uptime = Duration::ZERO;
        let result = self.drive(shutdown, &mut uptime).await;
        match &result {
            Ok(reason) => info!(reason = reason.as_label(), uptime = ?uptime, "session ended"),
            Err(err) => error!(error = %err, uptime = ?uptime, "session failed"),
        }
        SessionOutcome { result, uptime }
    }
}
