//! Status directory mirror and the in-memory state document.
//!
//! Each live fact about the session (`up`, `idle`, `full`, `players`,
//! `match`, `arena`, `session`) is one file in the status directory, created
//! when the fact becomes true and renamed aside to `last<name>` when it
//! stops, so observers can tell "never happened" from "happened, then
//! ended". Writes go through a `.lock` name and an atomic rename, which
//! keeps concurrent writers safe at the cost of last-writer-wins content.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::matches::writer::{self, SyncMeta};

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StateDoc {
    timestamp: Option<DateTime<Utc>>,
    spec: BTreeMap<String, Value>,
    stat: BTreeMap<String, Value>,
}

/// Publishes session facts to the status directory (when configured) and
/// mirrors them in memory for the end-of-session state artifact.
#[derive(Debug)]
pub struct StatusPublisher {
    stat_dir: Option<PathBuf>,
    state: Mutex<StateDoc>,
}

impl StatusPublisher {
    pub fn new(stat_dir: Option<PathBuf>) -> Self {
        Self {
            stat_dir,
            state: Mutex::new(StateDoc::default()),
        }
    }

    /// Sets a fact to the current time.
    pub fn mark(&self, name: &str) {
        self.set(name, Utc::now().to_rfc3339());
    }

    /// Sets a fact to an explicit value.
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        if name.is_empty() || name.starts_with("last") {
            return;
        }
        let value = value.into();
        self.update_state(name, Some(value.clone()));
        let Some(dir) = &self.stat_dir else { return };
        let body = match &value {
            Value::String(s) => s.clone().into_bytes(),
            other => match serde_json::to_vec(other) {
                Ok(body) => body,
                Err(err) => {
                    warn!(name, error = %err, "stat value unserializable");
                    return;
                }
            },
        };
        let file = dir.join(name);
        let lock = dir.join(format!("{name}.lock"));
        if let Err(err) = fs::write(&lock, body).and_then(|()| fs::rename(&lock, &file)) {
            warn!(name, error = %err, "stat write failed");
        }
    }

    /// Retires a fact, preserving its last value under `last<name>`.
    pub fn clear(&self, name: &str) {
        if name.is_empty() || name.starts_with("last") {
            return;
        }
        self.update_state(name, None);
        let Some(dir) = &self.stat_dir else { return };
        let file = dir.join(name);
        let last = dir.join(format!("last{name}"));
        if fs::rename(&file, &last).is_err() {
            // Nothing to retire, or rename unsupported; either way the fact
            // must not remain visible.
            let _ = fs::remove_file(&file);
        }
    }

    /// Retires every live fact. Used at session start (idempotence over
    /// restarts) and at session end.
    pub fn clear_all(&self) {
        let names: Vec<String> = match &self.stat_dir {
            Some(dir) => match fs::read_dir(dir) {
                Ok(entries) => entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .filter(|name| !name.starts_with("last"))
                    .collect(),
                Err(err) => {
                    debug!(error = %err, "stat dir unreadable");
                    Vec::new()
                }
            },
            None => {
                let state = self.lock();
                state.stat.keys().cloned().collect()
            }
        };
        for name in names {
            self.clear(&name);
        }
    }

    /// Seeds the state document's control half from the control directory.
    ///
    /// `restart` is special-cased: a restart marker predating this run has
    /// already been consumed.
    pub fn load_spec_state(&self, spec_dir: &Path, run_start: DateTime<Utc>) {
        let entries = match fs::read_dir(spec_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "spec dir unreadable");
                return;
            }
        };
        for entry in entries.filter_map(|entry| entry.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("last") || name.ends_with(".lock") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .map(|at| DateTime::<Utc>::from(at));
            let modified = match modified {
                Ok(at) => at,
                Err(err) => {
                    warn!(name, error = %err, "spec entry unreadable");
                    continue;
                }
            };
            let mut state = self.lock();
            if name != "restart" || modified > run_start {
                state.spec.insert(name, Value::String(modified.to_rfc3339()));
            } else {
                state.spec.remove(&name);
            }
        }
    }

    /// Persists the state document as `state.json.gz` in the log directory.
    pub fn save_state(&self, log_dir: &Path, session: &str) {
        if session.is_empty() {
            return;
        }
        let meta = SyncMeta::for_session(session);
        let file = log_dir.join("state.json.gz");
        let state = self.lock();
        if let Err(err) = writer::write_gz_json(&*state, &meta, &file) {
            warn!(error = %err, "state write failed");
        }
    }

    /// True when the fact is currently set. Test and introspection helper.
    pub fn has(&self, name: &str) -> bool {
        self.lock().stat.contains_key(name)
    }

    fn update_state(&self, name: &str, value: Option<Value>) {
        let mut state = self.lock();
        state.timestamp = Some(Utc::now());
        match value {
            Some(value) => {
                state.stat.insert(name.to_string(), value);
            }
            None => {
                state.stat.remove(name);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StateDoc> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
