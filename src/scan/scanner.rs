//! Scan state and the stdout/stderr scanning tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use super::ignore::{self, Stream};
use super::lines::{BoundedLines, LineError, LINE_LIMIT};
use super::{json, rules};
use crate::config::{IdlePolicy, LobbyConfig};
use crate::control::ControlSpec;
use crate::error::StopReason;
use crate::lobby::activity::ActivityTracker;
use crate::lobby::cancel::CancelCell;
use crate::lobby::sink::OutputSink;
use crate::lobby::status::StatusPublisher;
use crate::matches::{Kill, Match, MatchCollector};
use crate::players::{PlayerRegistry, RosterChange};

/// All state the stdout scanner owns plus handles to the shared accessors.
///
/// Only the stdout scanning task holds this value, so the scan state needs
/// no lock; everything other tasks read crosses one of the shared handles.
pub(crate) struct ScanCtx {
    pub cfg: Arc<LobbyConfig>,
    pub players: Arc<PlayerRegistry>,
    pub status: Arc<StatusPublisher>,
    pub spec: Arc<ControlSpec>,
    pub activity: Arc<ActivityTracker>,
    pub cancel: Arc<CancelCell>,
    pub sink: Arc<OutputSink>,
    pub collector: Option<MatchCollector>,
    pub run_start: DateTime<Utc>,

    session: String,
    arena: String,
    changed: bool,
    idles: u32,
    pending: Match,
    match_started: bool,
}

impl ScanCtx {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: Arc<LobbyConfig>,
        players: Arc<PlayerRegistry>,
        status: Arc<StatusPublisher>,
        spec: Arc<ControlSpec>,
        activity: Arc<ActivityTracker>,
        cancel: Arc<CancelCell>,
        sink: Arc<OutputSink>,
        collector: Option<MatchCollector>,
        run_start: DateTime<Utc>,
    ) -> Self {
        Self {
            cfg,
            players,
            status,
            spec,
            activity,
            cancel,
            sink,
            collector,
            run_start,
            session: String::new(),
            arena: String::new(),
            changed: false,
            idles: 0,
            pending: Match {
                timestamp: Utc::now(),
                ..Match::default()
            },
            match_started: false,
        }
    }

    fn match_in_progress(&self) -> bool {
        !self.pending.match_id.is_empty() || self.match_started
    }

    /// Finalizes the pending match: hands it to the collector if it saw any
    /// kills, and resets the idle-clock baseline either way.
    pub(crate) fn flush(&mut self) {
        let now = Utc::now();
        self.match_started = false;
        if self.pending.match_id.is_empty() {
            self.pending.timestamp = now;
            self.activity.end_match(now);
            return;
        }
        let m = std::mem::replace(
            &mut self.pending,
            Match {
                timestamp: now,
                ..Match::default()
            },
        );
        self.activity.end_match(now);
        self.status.clear("match");
        if m.kill_data.is_empty() {
            debug!(id = %m.match_id, "match discarded, no kill data");
            return;
        }
        match &self.collector {
            Some(collector) => {
                debug!(id = %m.match_id, kills = m.kill_data.len(), "match collected");
                collector.push(m);
            }
            None => debug!(id = %m.match_id, "match dropped, collection disabled"),
        }
    }

    pub(crate) fn apply_kill(&mut self, kill: Kill) {
        self.pending.kill_data.push(kill);
    }

    /// A decoded match line: refresh in place for the same id, otherwise
    /// flush-and-replace. Ids that cannot belong to this session are
    /// discarded without touching any state; they are stale lines from a
    /// previous token after a mid-stream rotation.
    pub(crate) fn apply_match_line(&mut self, mut m: Match) {
        if !json::id_matches_session(&m.match_id, &self.session) {
            warn!(id = %m.match_id, session = %self.session, "match id discarded, mismatched");
            return;
        }
        if m.match_id == self.pending.match_id {
            m.kill_data = std::mem::take(&mut self.pending.kill_data);
            m.timestamp = self.pending.timestamp;
            self.pending = m;
            return;
        }
        self.flush();
        let at = match json::parse_match_id_timestamp(&m.match_id, &self.session) {
            Some(at) => at,
            None => {
                warn!(id = %m.match_id, "match id timestamp unparseable, using current time");
                self.pending.timestamp
            }
        };
        m.timestamp = at;
        if m.arena_name.is_empty() {
            m.arena_name = self.arena.clone();
        }
        debug!(id = %m.match_id, at = %at, "match started");
        self.pending = m;
        self.activity.begin_match(at);
        self.status.set("match", at.to_rfc3339());
    }

    pub(crate) fn set_session(&mut self, token: &str) {
        self.session = token.to_string();
        self.status.set("session", token);
        debug!(session = token, "session token announced");
    }

    pub(crate) fn set_arena(&mut self, arena: &str) {
        self.arena = arena.to_string();
        self.status.clear("arena");
        self.status.set("arena", arena);
        debug!(arena, "arena changed");
    }

    /// Someone is trying to register; the lobby is not idle anymore.
    pub(crate) fn player_joining(&mut self) {
        self.status.clear("idle");
    }

    pub(crate) fn register_player(&mut self, body: &str) {
        let (before, _) = self.players.count();
        let change = self.players.add(body);
        let (players, bots) = self.players.count();
        match change {
            None => warn!(line = body, "unparseable player id"),
            Some(RosterChange::Bot { id }) => {
                self.changed = true;
                debug!(id, players, bots, "bot registered");
            }
            Some(RosterChange::Member { player, admin }) => {
                self.status.set("players", players as u64);
                debug!(id = player.id, admin, players, bots, "player registered");
            }
        }
        if before == 0 && players == 1 {
            self.status.clear("idle");
            // Flush to reset the idle-clock baseline.
            self.flush();
        }
        if players as u32 == self.cfg.max_players && (before as u32) < self.cfg.max_players {
            self.status.mark("full");
        }
    }

    pub(crate) fn unregister_player(&mut self, body: &str) {
        let (before, _) = self.players.count();
        let change = self.players.remove(body);
        let (players, bots) = self.players.count();
        match change {
            None => warn!(line = body, "unparseable player id"),
            Some(RosterChange::Bot { id }) => {
                self.changed = true;
                debug!(id, players, bots, "bot unregistered");
            }
            Some(RosterChange::Member { player, admin }) => {
                if players != 0 {
                    self.status.set("players", players as u64);
                }
                if admin && !self.match_in_progress() {
                    // Admin changed between matches; restart its timeout clock.
                    self.flush();
                }
                debug!(id = player.id, was_admin = admin, players, bots, "player unregistered");
            }
        }
        if before != 0 && players == 0 {
            self.status.clear("players");
            self.flush();
            self.idle_transition();
        }
        if (before as u32) >= self.cfg.max_players && (players as u32) + 1 == self.cfg.max_players
        {
            self.status.clear("full");
        }
    }

    fn idle_transition(&mut self) {
        match self.cfg.idle_policy {
            IdlePolicy::Timeout => self.status.mark("idle"),
            IdlePolicy::Restart { max_idles } => {
                if !self.changed {
                    self.status.mark("idle");
                    return;
                }
                self.idles += 1;
                if self.idles < max_idles {
                    self.status.mark("idle");
                    return;
                }
                let snapshot = self.spec.snapshot();
                let (force, reason) =
                    snapshot.reason_after(self.run_start, Duration::ZERO, Duration::ZERO, None);
                let reason = reason.unwrap_or(StopReason::IdleTimeout);
                debug!(
                    reason = reason.as_label(),
                    force,
                    idles = self.idles,
                    "idle limit reached"
                );
                self.cancel.cancel(reason);
            }
        }
    }

    /// Fires once before any player joins to set defaults; only counts as a
    /// player-visible change when someone is actually in the lobby.
    pub(crate) fn defaults_changed(&mut self) {
        if self.players.count().0 != 0 {
            self.changed = true;
        }
    }

    /// Alternate match-start detector: bounds admin-timeout exposure when
    /// the first kill event is slow to arrive.
    pub(crate) fn game_state_changed(&mut self) {
        if !self.match_in_progress() && self.players.count().0 != 0 {
            self.match_started = true;
            self.activity.mark_active();
        }
    }

    pub(crate) fn pool_populated(&mut self) {
        if self.players.count().0 == 0 {
            self.status.mark("idle");
        }
    }

    pub(crate) fn session_lost(&mut self) {
        debug!(reason = StopReason::Disconnected.as_label(), "session lost");
        self.cancel.cancel(StopReason::Disconnected);
    }
}

/// Consumes the worker's stdout. The sole mutator of scan state; on EOF it
/// performs the final flush, closes the match queue, and records `Done`.
pub(crate) async fn run_stdout<R>(mut ctx: ScanCtx, reader: R, mut tee: Option<std::fs::File>)
where
    R: AsyncRead + Unpin,
{
    let sink = ctx.sink.clone();
    let mut lines = BoundedLines::new(reader, LINE_LIMIT);
    while let Some(next) = lines.next_line().await {
        let line = match next {
            Ok(line) => line,
            Err(LineError::TooLong { len }) => {
                warn!(len, "stdout line skipped");
                continue;
            }
            Err(LineError::Io(err)) => {
                warn!(error = %err, "stdout read failed");
                break;
            }
        };
        if let Some(file) = tee.as_mut() {
            use std::io::Write;
            let _ = writeln!(file, "{line}");
        }
        if ignore::is_ignored(Stream::Stdout, &line) {
            continue;
        }
        let is_json = json::looks_like_json(&line);
        rules::dispatch(&mut ctx, &line);
        if is_json {
            sink.stdout_line(&ignore::truncate_for_display(
                &line,
                ignore::JSON_DISPLAY_LIMIT,
            ));
        } else {
            sink.stdout_line(&line);
        }
    }
    ctx.flush();
    // Dropping the producer closes the queue; collector workers drain and exit.
    ctx.collector = None;
    ctx.cancel.cancel(StopReason::Done);
    debug!("stdout scanner done");
}

/// Consumes the worker's stderr: filter and forward only.
pub(crate) async fn run_stderr<R>(reader: R, sink: Arc<OutputSink>, cancel: Arc<CancelCell>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BoundedLines::new(reader, LINE_LIMIT);
    while let Some(next) = lines.next_line().await {
        match next {
            Ok(line) => {
                if !ignore::is_ignored(Stream::Stderr, &line) {
                    sink.stderr_line(&line);
                }
            }
            Err(LineError::TooLong { len }) => warn!(len, "stderr line skipped"),
            Err(LineError::Io(err)) => {
                warn!(error = %err, "stderr read failed");
                break;
            }
        }
    }
    cancel.cancel(StopReason::Done);
    debug!("stderr scanner done");
}
