//! Match and kill-event records as the worker emits them.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

pub const BLUE_TEAM: Team = Team(0);
pub const PINK_TEAM: Team = Team(1);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Team(pub i32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

fn epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

fn f64_is_zero(v: &f64) -> bool {
    *v == 0.0
}

/// One finalized (or pending) match.
///
/// `timestamp` is supervisor-side bookkeeping: the moment the match was first
/// observed, refined to the timestamp embedded in the match id once parsed.
/// The remaining fields mirror the worker's JSON verbatim.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Match {
    #[serde(rename = "@timestamp", default = "epoch")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "matchId", default, skip_serializing_if = "String::is_empty")]
    pub match_id: String,
    #[serde(rename = "arenaName", default)]
    pub arena_name: String,
    #[serde(rename = "team0Score", default)]
    pub team0_score: i32,
    #[serde(rename = "team1Score", default)]
    pub team1_score: i32,
    #[serde(
        rename = "matchStartTime",
        default,
        skip_serializing_if = "f64_is_zero"
    )]
    pub match_start_time: f64,
    #[serde(rename = "gameMode", default)]
    pub game_mode: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(rename = "killData", default)]
    pub kill_data: Vec<Kill>,
}

impl Default for Match {
    fn default() -> Self {
        Self {
            timestamp: epoch(),
            match_id: String::new(),
            arena_name: String::new(),
            team0_score: 0,
            team1_score: 0,
            match_start_time: 0.0,
            game_mode: 0,
            version: String::new(),
            kill_data: Vec::new(),
        }
    }
}

/// One kill event, straight off the wire.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Kill {
    #[serde(rename = "shooterId", default, skip_serializing_if = "String::is_empty")]
    pub shooter_id: String,
    #[serde(
        rename = "shooterName",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub shooter_name: String,
    #[serde(rename = "shooterTeam", default)]
    pub shooter_team: Team,
    #[serde(rename = "shooterIsBot", default)]
    pub shooter_is_bot: bool,
    #[serde(rename = "enemyId", default, skip_serializing_if = "String::is_empty")]
    pub enemy_id: String,
    #[serde(rename = "enemyName", default, skip_serializing_if = "String::is_empty")]
    pub enemy_name: String,
    #[serde(rename = "enemyTeam", default)]
    pub enemy_team: Team,
    #[serde(rename = "enemyIsBot", default)]
    pub enemy_is_bot: bool,
    #[serde(rename = "shooterLocation", default)]
    pub shooter_location: Location,
    #[serde(rename = "shotOrigin", default)]
    pub shot_origin: Location,
    #[serde(rename = "impactLocation", default)]
    pub impact_location: Location,
    #[serde(rename = "impactLocationLocal", default)]
    pub impact_location_local: Location,
    #[serde(rename = "impactCollider", default)]
    pub impact_collider: String,
    #[serde(rename = "enemyLocation", default)]
    pub enemy_location: Location,
    #[serde(rename = "roundNumber", default)]
    pub round_number: i32,
    #[serde(rename = "roundStartTime", default)]
    pub round_start_time: f64,
    #[serde(rename = "killTime", default)]
    pub kill_time: f64,
}

impl Match {
    /// Rebases round and kill times onto the match start and zeroes the
    /// offset. Idempotent: once the offset is zero, rebasing subtracts zero.
    pub fn normalize(&mut self) {
        for kill in &mut self.kill_data {
            kill.round_start_time -= self.match_start_time;
            kill.kill_time -= self.match_start_time;
        }
        self.match_start_time = 0.0;
    }

    /// Strips identifying fields for the clean artifact.
    ///
    /// Ids, the match id, and the version are cleared. Names already in the
    /// synthetic `Player N` / `Bot N` form are kept; everything else gets a
    /// fresh sequential `Player N` alias, assigned in randomized order but
    /// stable within the match.
    pub fn anonymize(&mut self) {
        let mut reserved: Vec<String> = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for kill in &self.kill_data {
            for name in [&kill.shooter_name, &kill.enemy_name] {
                if name.is_empty() {
                    continue;
                }
                if is_synthetic_name(name) {
                    if !reserved.contains(name) {
                        reserved.push(name.clone());
                    }
                } else if !pending.contains(name) {
                    pending.push(name.clone());
                }
            }
        }
        pending.shuffle(&mut rand::thread_rng());

        let mut aliases: Vec<(String, String)> = Vec::with_capacity(pending.len());
        let mut next = 1u32;
        for name in pending {
            let alias = loop {
                let candidate = format!("Player {next}");
                next += 1;
                if !reserved.contains(&candidate) {
                    break candidate;
                }
            };
            aliases.push((name, alias));
        }

        let rename = |name: &mut String| {
            if let Some((_, alias)) = aliases.iter().find(|(from, _)| from.as_str() == name.as_str())
            {
                *name = alias.clone();
            }
        };
        for kill in &mut self.kill_data {
            kill.shooter_id.clear();
            kill.enemy_id.clear();
            rename(&mut kill.shooter_name);
            rename(&mut kill.enemy_name);
        }
        self.match_id.clear();
        self.version.clear();
    }
}

fn is_synthetic_name(name: &str) -> bool {
    let rest = name
        .strip_prefix("Player ")
        .or_else(|| name.strip_prefix("Bot "));
    match rest {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}
