//! Control timestamps and the cancellation-reason precedence table.

use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::StopReason;

/// One snapshot of every control condition.
///
/// A condition is "active after `t`" when its timestamp postdates `t`; the
/// `peer/idle` and `peer/up` signals count by presence alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpecState {
    pub up: Option<DateTime<Utc>>,
    pub flag_up: Option<DateTime<Utc>>,
    pub peer_full: Option<DateTime<Utc>>,

    pub down: Option<DateTime<Utc>>,
    pub flag_down: Option<DateTime<Utc>>,
    pub peer_idle: Option<DateTime<Utc>>,
    pub force_down: Option<DateTime<Utc>>,
    pub flag_force_down: Option<DateTime<Utc>>,

    pub restart: Option<DateTime<Utc>>,
    pub flag_restart: Option<DateTime<Utc>>,
    pub force_restart: Option<DateTime<Utc>>,
    pub flag_force_restart: Option<DateTime<Utc>>,

    pub stop: Option<DateTime<Utc>>,
    pub peer_up: Option<DateTime<Utc>>,
    pub flag_stop: Option<DateTime<Utc>>,
    pub force_stop: Option<DateTime<Utc>>,
    pub flag_force_stop: Option<DateTime<Utc>>,
}

fn after(field: Option<DateTime<Utc>>, t: DateTime<Utc>) -> bool {
    field.map_or(false, |at| at > t)
}

impl SpecState {
    pub fn down_after(&self, t: DateTime<Utc>) -> bool {
        after(self.down, t) || after(self.flag_down, t) || self.peer_idle.is_some()
    }

    pub fn force_down_after(&self, t: DateTime<Utc>) -> bool {
        after(self.force_down, t) || after(self.flag_force_down, t)
    }

    pub fn stop_after(&self, t: DateTime<Utc>) -> bool {
        after(self.stop, t) || after(self.flag_stop, t) || self.peer_up.is_some()
    }

    pub fn force_stop_after(&self, t: DateTime<Utc>) -> bool {
        after(self.force_stop, t) || after(self.flag_force_stop, t)
    }

    pub fn restart_after(&self, t: DateTime<Utc>) -> bool {
        after(self.restart, t) || after(self.flag_restart, t)
    }

    pub fn force_restart_after(&self, t: DateTime<Utc>) -> bool {
        after(self.force_restart, t) || after(self.flag_force_restart, t)
    }

    /// Evaluates the cancellation precedence table.
    ///
    /// Forced conditions are checked first: they must win regardless of any
    /// other pending state, because they are the operator's unconditional
    /// override. Plain stop is gated behind `min_uptime`; the uptime ceiling
    /// comes last. Conditions can and do carry identical timestamps.
    pub fn reason_after(
        &self,
        run_start: DateTime<Utc>,
        since_idle: Duration,
        min_uptime: Duration,
        max_uptime: Option<Duration>,
    ) -> (bool, Option<StopReason>) {
        if self.force_down_after(run_start) {
            return (true, Some(StopReason::Downed));
        }
        if self.force_stop_after(run_start) {
            return (true, Some(StopReason::Stopped));
        }
        if self.force_restart_after(run_start) {
            return (true, Some(StopReason::Restarted));
        }
        if self.down_after(run_start) {
            return (false, Some(StopReason::Downed));
        }
        if since_idle > min_uptime && self.stop_after(run_start) {
            return (false, Some(StopReason::Stopped));
        }
        if self.restart_after(run_start) {
            return (false, Some(StopReason::Restarted));
        }
        if let Some(max) = max_uptime {
            if !max.is_zero() && since_idle > max {
                return (false, Some(StopReason::Timeout));
            }
        }
        (false, None)
    }

    pub(crate) fn field_mut(&mut self, name: &str) -> Option<&mut Option<DateTime<Utc>>> {
        match name {
            "up" => Some(&mut self.up),
            "flag/up" => Some(&mut self.flag_up),
            "peer/full" => Some(&mut self.peer_full),
            "down" => Some(&mut self.down),
            "flag/down" => Some(&mut self.flag_down),
            "peer/idle" => Some(&mut self.peer_idle),
            "forcedown" => Some(&mut self.force_down),
            "flag/forcedown" => Some(&mut self.flag_force_down),
            "restart" => Some(&mut self.restart),
            "flag/restart" => Some(&mut self.flag_restart),
            "forcerestart" => Some(&mut self.force_restart),
            "flag/forcerestart" => Some(&mut self.flag_force_restart),
            "stop" => Some(&mut self.stop),
            "peer/up" => Some(&mut self.peer_up),
            "flag/stop" => Some(&mut self.flag_stop),
            "forcestop" => Some(&mut self.force_stop),
            "flag/forcestop" => Some(&mut self.flag_force_stop),
            _ => None,
        }
    }

    fn field(&self, name: &str) -> Option<Option<DateTime<Utc>>> {
        let mut copy = *self;
        copy.field_mut(name).map(|slot| *slot)
    }
}

/// How one control-file update changes its field.
///
/// - Non-empty body: parsed as a JSON RFC 3339 timestamp; unparseable bodies
///   keep the current value.
/// - Empty body with a trailing newline: activate now (`touch`-style command).
/// - Empty or missing body without a newline: revert to the binding-start
///   baseline. This single rule makes deletion clear a condition while a
///   create-then-delete race within one batch stays a no-op.
pub(crate) fn apply_body(
    current: Option<DateTime<Utc>>,
    baseline: Option<DateTime<Utc>>,
    body: Option<&[u8]>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let body = body.unwrap_or_default();
    let newline = body.last() == Some(&b'\n');
    let body = if newline { &body[..body.len() - 1] } else { body };
    match (newline, body.is_empty()) {
        (false, true) => baseline,
        (true, true) => Some(now),
        _ => match serde_json::from_slice::<DateTime<Utc>>(body) {
            Ok(at) => Some(at),
            Err(err) => {
                debug!(error = %err, "unparseable control timestamp kept previous value");
                current
            }
        },
    }
}

/// Shared, snapshot-readable control state.
///
/// Written only by the control-directory watcher callback; read by the idle
/// watcher and the restart loop. Readers always copy the whole state.
#[derive(Debug, Default)]
pub struct ControlSpec {
    state: RwLock<SpecState>,
}

impl ControlSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SpecState {
        match self.state.read() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub(crate) fn apply(&self, name: &str, body: Option<&[u8]>, baseline: &SpecState) {
        let Some(base) = baseline.field(name) else {
            return;
        };
        let now = Utc::now();
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(slot) = state.field_mut(name) {
            let updated = apply_body(*slot, base, body, now);
            if updated != *slot {
                debug!(name, at = ?updated, "control condition updated");
            }
            *slot = updated;
        }
    }

    pub(crate) fn restore(&self, baseline: &SpecState) {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        *state = *baseline;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn forced_conditions_win_over_everything() {
        let spec = SpecState {
            force_down: Some(at(100)),
            force_stop: Some(at(100)),
            force_restart: Some(at(100)),
            down: Some(at(100)),
            stop: Some(at(100)),
            restart: Some(at(100)),
            ..SpecState::default()
        };
        let (forced, reason) =
            spec.reason_after(at(50), Duration::from_secs(3600), Duration::ZERO, None);
        assert!(forced);
        assert_eq!(reason, Some(StopReason::Downed));
    }

    #[test]
    fn plain_down_beats_stop_and_restart() {
        let spec = SpecState {
            down: Some(at(100)),
            stop: Some(at(100)),
            restart: Some(at(100)),
            ..SpecState::default()
        };
        let (forced, reason) =
            spec.reason_after(at(50), Duration::from_secs(3600), Duration::ZERO, None);
        assert!(!forced);
        assert_eq!(reason, Some(StopReason::Downed));
    }

    #[test]
    fn stop_is_gated_by_min_uptime() {
        let spec = SpecState {
            stop: Some(at(100)),
            ..SpecState::default()
        };
        let min = Duration::from_secs(60);
        let (_, reason) = spec.reason_after(at(50), Duration::from_secs(10), min, None);
        assert_eq!(reason, None);
        let (_, reason) = spec.reason_after(at(50), Duration::from_secs(90), min, None);
        assert_eq!(reason, Some(StopReason::Stopped));
    }

    #[test]
    fn stale_conditions_do_not_fire() {
        let spec = SpecState {
            down: Some(at(10)),
            ..SpecState::default()
        };
        let (_, reason) = spec.reason_after(at(50), Duration::ZERO, Duration::ZERO, None);
        assert_eq!(reason, None);
    }

    #[test]
    fn peer_signals_count_by_presence() {
        let spec = SpecState {
            peer_idle: Some(at(10)),
            ..SpecState::default()
        };
        // Predates run start, still active.
        let (forced, reason) = spec.reason_after(at(50), Duration::ZERO, Duration::ZERO, None);
        assert!(!forced);
        assert_eq!(reason, Some(StopReason::Downed));
    }

    #[test]
    fn max_uptime_fires_last() {
        let spec = SpecState::default();
        let max = Some(Duration::from_secs(60));
        let (_, reason) = spec.reason_after(at(50), Duration::from_secs(90), Duration::ZERO, max);
        assert_eq!(reason, Some(StopReason::Timeout));
        let (_, reason) = spec.reason_after(at(50), Duration::from_secs(30), Duration::ZERO, max);
        assert_eq!(reason, None);
    }

    #[test]
    fn empty_body_with_newline_activates_now() {
        let now = at(500);
        assert_eq!(apply_body(None, None, Some(b"\n"), now), Some(now));
    }

    #[test]
    fn empty_body_without_newline_reverts_to_baseline() {
        let now = at(500);
        // Baseline inactive: a create-then-delete race stays a no-op.
        assert_eq!(apply_body(Some(at(100)), None, Some(b""), now), None);
        assert_eq!(apply_body(Some(at(100)), None, None, now), None);
        // Baseline active: deletion restores it.
        assert_eq!(
            apply_body(Some(at(100)), Some(at(20)), None, now),
            Some(at(20))
        );
    }

    #[test]
    fn json_body_parses_as_timestamp() {
        let now = at(500);
        let body = br#""2026-02-03T04:05:06Z""#;
        assert_eq!(
            apply_body(None, None, Some(body.as_slice()), now),
            Some(Utc.with_ymd_and_hms(2026, 2, 3, 4, 5, 6).unwrap())
        );
    }

    #[test]
    fn garbage_body_keeps_current_value() {
        let now = at(500);
        assert_eq!(
            apply_body(Some(at(42)), None, Some(b"not json"), now),
            Some(at(42))
        );
    }

    #[test]
    fn unknown_names_are_ignored() {
        let spec = ControlSpec::new();
        let baseline = spec.snapshot();
        spec.apply("garbage", Some(b"\n"), &baseline);
        assert_eq!(spec.snapshot(), SpecState::default());
    }

    #[test]
    fn apply_and_restore_round_trip() {
        let spec = ControlSpec::new();
        let baseline = spec.snapshot();
        spec.apply("down", Some(b"\n"), &baseline);
        assert!(spec.snapshot().down.is_some());
        spec.restore(&baseline);
        assert_eq!(spec.snapshot(), baseline);
    }
}
