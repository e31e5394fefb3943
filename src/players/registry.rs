//! The roster map, bot set, and admin selection.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Ids below this are bots. bots < 1000 <= players.
pub const BOT_ID_CEILING: i64 = 1000;

/// One registered (non-bot) player.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Player {
    pub id: i64,
    pub name: String,
    pub uuid: String,
}

/// What an add/update/remove did to the roster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RosterChange {
    /// A bot id was touched; bots never appear in lookups or admin selection.
    Bot { id: i64 },
    /// A player record. On add/update, `admin` says whether this player holds
    /// admin afterward; on remove, whether the departed player held it (and
    /// admin therefore migrated).
    Member { player: Player, admin: bool },
}

#[derive(Default)]
struct Roster {
    bots: HashSet<i64>,
    joins: HashMap<i64, Player>,
    admin: Option<i64>,
}

impl Roster {
    fn upsert(&mut self, id: i64, name: &str, uuid: &str) -> RosterChange {
        if id < BOT_ID_CEILING {
            self.bots.insert(id);
            return RosterChange::Bot { id };
        }
        let player = self.joins.entry(id).or_insert_with(|| Player {
            id,
            ..Player::default()
        });
        if !name.is_empty() {
            player.name = name.to_string();
        }
        if !uuid.is_empty() {
            player.uuid = uuid.to_string();
        }
        let player = player.clone();
        // Admin is always the lowest present id.
        if self.admin.map_or(true, |admin| id < admin) {
            self.admin = Some(id);
        }
        RosterChange::Member {
            admin: self.admin == Some(id),
            player,
        }
    }

    fn migrate(&mut self, departed: i64) -> bool {
        if self.admin != Some(departed) {
            return false;
        }
        self.admin = self.joins.keys().copied().min();
        true
    }
}

/// Concurrent player roster.
///
/// Mutated only by the stdout scanner; read from the idle watcher and status
/// paths. Admin migration is atomic with the removal under one lock
/// acquisition, so there is never a window with players present but no admin.
#[derive(Default)]
pub struct PlayerRegistry {
    roster: RwLock<Roster>,
}

fn parse_id(raw: &str) -> Option<i64> {
    let id: i64 = raw.trim().parse().ok()?;
    (id >= 1).then_some(id)
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an id. Returns `None` for a malformed id (logged and
    /// discarded by the caller; never fatal).
    pub fn add(&self, raw: &str) -> Option<RosterChange> {
        self.update(raw, "", "")
    }

    /// Registers an id, merging any non-empty identity fields.
    pub fn update(&self, raw: &str, name: &str, uuid: &str) -> Option<RosterChange> {
        let id = parse_id(raw)?;
        Some(self.write().upsert(id, name, uuid))
    }

    /// Drops an id from whichever set holds it. Admin migrates to the lowest
    /// remaining id in the same critical section.
    pub fn remove(&self, raw: &str) -> Option<RosterChange> {
        let id = parse_id(raw)?;
        let mut roster = self.write();
        if roster.bots.remove(&id) {
            return Some(RosterChange::Bot { id });
        }
        let player = roster.joins.remove(&id)?;
        let admin = roster.migrate(id);
        Some(RosterChange::Member { player, admin })
    }

    /// Looks up a present player and whether it currently holds admin.
    pub fn lookup(&self, id: i64) -> Option<(Player, bool)> {
        let roster = self.read();
        let player = roster.joins.get(&id)?.clone();
        Some((player, roster.admin == Some(id)))
    }

    /// Returns `(players, bots)` under a read lock.
    pub fn count(&self) -> (usize, usize) {
        let roster = self.read();
        (roster.joins.len(), roster.bots.len())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Roster> {
        match self.roster.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Roster> {
        match self.roster.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
