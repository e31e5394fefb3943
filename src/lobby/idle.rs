//! Idle, admin, and control-plane timeout watching.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::activity::ActivityTracker;
use super::cancel::CancelCell;
use crate::config::LobbyConfig;
use crate::control::{ControlSpec, SpecState};
use crate::error::StopReason;
use crate::players::PlayerRegistry;

/// Minimum tick; anything faster is wasted wakeups.
pub(crate) const TICK_FLOOR: Duration = Duration::from_millis(200);

/// Tick when no timeout is configured. The watcher still runs so
/// control-plane commands apply mid-session.
pub(crate) const TICK_DEFAULT: Duration = Duration::from_secs(15);

pub(crate) fn tick_interval(cfg: &LobbyConfig) -> Duration {
    let mut every = TICK_DEFAULT;
    for timeout in [cfg.timeout, cfg.admin_timeout].into_iter().flatten() {
        if !timeout.is_zero() && timeout < every {
            every = timeout;
        }
    }
    every.max(TICK_FLOOR)
}

/// One tick's verdict, as a pure function of the observed state.
///
/// Ordering is the contract:
/// 1. forced down cancels regardless of match state,
/// 2. an in-progress match suspends every other timeout,
/// 3. control-plane reasons apply, but only forced ones may kick players
///    out of a populated lobby,
/// 4. the admin timeout applies while players are present,
/// 5. the idle timeout applies to an empty lobby.
///
/// Exactly one reason is ever produced.
pub(crate) fn decide(
    spec: &SpecState,
    cfg: &LobbyConfig,
    run_start: DateTime<Utc>,
    players: usize,
    match_active: bool,
    since_idle: Duration,
) -> Option<StopReason> {
    if spec.force_down_after(run_start) {
        return Some(StopReason::Downed);
    }
    if match_active {
        return None;
    }
    let (forced, mut reason) =
        spec.reason_after(run_start, since_idle, cfg.min_uptime, cfg.max_uptime);
    if players != 0 {
        if !forced {
            // Do not kick players from a live lobby unless forced.
            reason = None;
        }
        if reason.is_none() {
            if let Some(admin_timeout) = cfg.admin_timeout {
                if !admin_timeout.is_zero() && since_idle > admin_timeout {
                    reason = Some(StopReason::AdminTimeout);
                }
            }
        }
    } else if reason.is_none() {
        if let Some(timeout) = cfg.timeout {
            if !timeout.is_zero() && since_idle > timeout {
                reason = Some(StopReason::IdleTimeout);
            }
        }
    }
    reason
}

/// The ticking watcher task. Exits when it cancels the session or the
/// session cancels around it.
pub(crate) async fn run(
    cfg: Arc<LobbyConfig>,
    spec: Arc<ControlSpec>,
    players: Arc<PlayerRegistry>,
    activity: Arc<ActivityTracker>,
    cancel: Arc<CancelCell>,
    run_start: DateTime<Utc>,
) {
    let every = tick_interval(&cfg);
    debug!(
        every = ?every,
        timeout = ?cfg.timeout,
        admin_timeout = ?cfg.admin_timeout,
        min_uptime = ?cfg.min_uptime,
        "idle watcher running"
    );
    let token = cancel.token();
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // first tick is immediate; skip it
    let mut last_up = activity.snapshot().last_flush;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = token.cancelled() => break,
        }
        let now = Utc::now();
        let snapshot = spec.snapshot();
        if snapshot.up.is_some() || snapshot.peer_full.is_some() {
            // An `up`/`peer full` signal pins the idle clock to now.
            last_up = now;
        }
        let observed = activity.snapshot();
        let last_idle = observed.last_flush.max(last_up);
        let since_idle = (now - last_idle).to_std().unwrap_or_default();
        let (player_count, bots) = players.count();
        if let Some(reason) = decide(
            &snapshot,
            &cfg,
            run_start,
            player_count,
            observed.match_active,
            since_idle,
        ) {
            debug!(
                reason = reason.as_label(),
                players = player_count,
                bots,
                since_idle = ?since_idle,
                "idle watcher cancelling"
            );
            cancel.cancel(reason);
            break;
        }
    }
    debug!("idle watcher done");
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn cfg() -> LobbyConfig {
        LobbyConfig {
            timeout: Some(Duration::from_secs(60)),
            admin_timeout: Some(Duration::from_secs(120)),
            ..LobbyConfig::default()
        }
    }

    #[test]
    fn forced_down_wins_even_mid_match_with_players() {
        let spec = SpecState {
            force_down: Some(at(100)),
            ..SpecState::default()
        };
        let reason = decide(&spec, &cfg(), at(50), 2, true, Duration::ZERO);
        assert_eq!(reason, Some(StopReason::Downed));
    }

    #[test]
    fn a_match_in_progress_suspends_timeouts() {
        let spec = SpecState {
            down: Some(at(100)),
            ..SpecState::default()
        };
        let reason = decide(&spec, &cfg(), at(50), 2, true, Duration::from_secs(9999));
        assert_eq!(reason, None);
    }

    #[test]
    fn plain_reasons_never_kick_present_players() {
        let spec = SpecState {
            down: Some(at(100)),
            ..SpecState::default()
        };
        let reason = decide(&spec, &cfg(), at(50), 1, false, Duration::ZERO);
        assert_eq!(reason, None);
        // Empty lobby: the same condition applies immediately.
        let reason = decide(&spec, &cfg(), at(50), 0, false, Duration::ZERO);
        assert_eq!(reason, Some(StopReason::Downed));
    }

    #[test]
    fn admin_timeout_applies_only_with_players() {
        let spec = SpecState::default();
        let long = Duration::from_secs(150);
        assert_eq!(
            decide(&spec, &cfg(), at(50), 1, false, long),
            Some(StopReason::AdminTimeout)
        );
        assert_eq!(
            decide(&spec, &cfg(), at(50), 0, false, Duration::from_secs(90)),
            Some(StopReason::IdleTimeout)
        );
        assert_eq!(
            decide(&spec, &cfg(), at(50), 1, false, Duration::from_secs(90)),
            None
        );
    }

    #[test]
    fn unconfigured_timeouts_never_fire() {
        let quiet = LobbyConfig::default();
        let spec = SpecState::default();
        assert_eq!(
            decide(&spec, &quiet, at(50), 0, false, Duration::from_secs(86400)),
            None
        );
    }

    #[test]
    fn tick_tracks_the_tightest_timeout() {
        assert_eq!(tick_interval(&LobbyConfig::default()), TICK_DEFAULT);
        let cfg = LobbyConfig {
            timeout: Some(Duration::from_secs(2)),
            admin_timeout: Some(Duration::from_secs(7)),
            ..LobbyConfig::default()
        };
        assert_eq!(tick_interval(&cfg), Duration::from_secs(2));
        let cfg = LobbyConfig {
            timeout: Some(Duration::from_millis(10)),
            ..LobbyConfig::default()
        };
        assert_eq!(tick_interval(&cfg), TICK_FLOOR);
    }

    // Real time on purpose: the idle clock is wall-clock driven.
    #[tokio::test]
    async fn watcher_cancels_an_idle_lobby() {
        let cfg = Arc::new(LobbyConfig {
            timeout: Some(Duration::from_millis(300)),
            ..LobbyConfig::default()
        });
        let cancel = Arc::new(CancelCell::new());
        let task = tokio::spawn(run(
            cfg,
            Arc::new(ControlSpec::new()),
            Arc::new(PlayerRegistry::new()),
            Arc::new(ActivityTracker::new(Utc::now())),
            cancel.clone(),
            Utc::now(),
        ));
        let joined = tokio::time::timeout(Duration::from_secs(5), task).await;
        joined.expect("watcher must cancel within bounds").expect("watcher join");
        assert!(cancel.token().is_cancelled());
    }
}
