//! Bounded match queue and the persistence worker pool.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::SecondsFormat;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::record::Match;
use super::writer::{self, SyncMeta};
use crate::error::LobbyError;
use crate::lobby::cancel::CancelCell;

/// Queue depth between the scanner and the workers.
pub const QUEUE_DEPTH: usize = 10;

/// Two identical workers drain the same queue; one wedged write does not
/// stop collection.
pub const WORKERS: usize = 2;

#[derive(Clone, Debug)]
pub struct CollectorOptions {
    pub log_dir: PathBuf,
    pub session: String,
    /// Also write anonymized `-clean` companions.
    pub clean: bool,
}

/// Producer handle for finalized matches.
///
/// Dropping it closes the queue; the workers drain what is left and exit.
pub struct MatchCollector {
    tx: mpsc::Sender<Match>,
}

impl MatchCollector {
    /// Spawns the worker pool and returns the producer handle plus the
    /// worker tasks for the session runner to join.
    pub(crate) fn spawn(
        options: CollectorOptions,
        cancel: Arc<CancelCell>,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let rx = Arc::new(Mutex::new(rx));
        let options = Arc::new(options);
        let workers = (0..WORKERS)
            .map(|worker| {
                tokio::spawn(drain(
                    worker,
                    rx.clone(),
                    options.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        (Self { tx }, workers)
    }

    /// Enqueues a finalized match. If the queue is full the match is dropped
    /// and logged: blocking here would stall the scanner and, through the
    /// stdout pipe, the worker process itself.
    pub(crate) fn push(&self, m: Match) {
        match self.tx.try_send(m) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(m)) => {
                warn!(id = %m.match_id, "match discarded, queue full");
            }
            Err(mpsc::error::TrySendError::Closed(m)) => {
                warn!(id = %m.match_id, "match discarded, queue closed");
            }
        }
    }
}

async fn drain(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<Match>>>,
    options: Arc<CollectorOptions>,
    cancel: Arc<CancelCell>,
) {
    loop {
        let next = { rx.lock().await.recv().await };
        let Some(mut m) = next else { break };
        m.normalize();
        let meta = SyncMeta::for_session(&options.session);
        // Windows does not allow ':' in file names.
        let ts = m
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .replace(':', "_");

        let file = options.log_dir.join(format!("{ts}-match.json.gz"));
        debug!(id = %m.match_id, file = %file.display(), "persisting match");
        persist(&m, &meta, file, &cancel).await;

        if options.clean {
            m.anonymize();
            let file = options.log_dir.join(format!("{ts}-clean.json.gz"));
            persist(&m, &meta, file, &cancel).await;
        }
    }
    debug!(worker, "collector done");
}

async fn persist(m: &Match, meta: &SyncMeta, file: PathBuf, cancel: &CancelCell) {
    let m = m.clone();
    let meta = meta.clone();
    let shown = file.display().to_string();
    let wrote = tokio::task::spawn_blocking(move || writer::write_gz_json(&m, &meta, &file)).await;
    let err = match wrote {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err.to_string(),
        Err(join) => join.to_string(),
    };
    error!(error = %err, file = %shown, "match write failed");
    cancel.fail(LobbyError::Collector(err));
}
