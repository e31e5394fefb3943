//! The debounced watcher: setup traversal, symlink aliasing, delivery task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;

use super::event::{WatchEvent, WatchFilter, WatchNotice, WatchOp};
use crate::error::WatchError;

/// Where and how fast to watch.
#[derive(Clone, Debug)]
pub struct WatchOptions {
    pub path: PathBuf,
    /// Quiet period before a buffered batch flushes.
    pub tick: Duration,
}

/// Handle to a running watch. [`stop`](WatchGuard::stop) shuts it down
/// cleanly; dropping it aborts the delivery task without the final notices.
pub struct WatchGuard {
    token: CancellationToken,
    handle: JoinHandle<()>,
    _watcher: RecommendedWatcher,
}

impl WatchGuard {
    /// Closes the OS watch and waits for the delivery task to finish.
    /// No notice is delivered after this returns.
    pub async fn stop(mut self) {
        self.token.cancel();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Starts watching `options.path` recursively.
///
/// The initial synthetic batch is filtered and delivered to `handler` before
/// this function returns; the delivery task then takes over. Setup failures
/// (bad path, duplicate symlink targets, watcher allocation) are returned
/// synchronously; later failures arrive as [`WatchNotice::Error`] followed by
/// [`WatchNotice::Closed`].
///
/// Must be called from within a tokio runtime.
pub fn watch<F>(
    options: WatchOptions,
    filters: Vec<WatchFilter>,
    mut handler: F,
) -> Result<WatchGuard, WatchError>
where
    F: FnMut(WatchNotice) + Send + 'static,
{
    if options.path.as_os_str().is_empty() {
        return Err(WatchError::PathUnconfigured);
    }
    if options.tick.is_zero() {
        return Err(WatchError::TickUnconfigured);
    }
    let root = options.path.canonicalize()?;

    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(
        move |res: Result<notify::Event, notify::Error>| {
            let _ = raw_tx.send(res);
        },
    )?;

    let mut aliases: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut initial: Vec<WatchEvent> = Vec::new();
    let mut roots: Vec<(PathBuf, PathBuf)> = vec![(root.clone(), root.clone())];
    let mut next = 0;
    while next < roots.len() {
        let (real_root, logical_root) = roots[next].clone();
        next += 1;
        for entry in WalkDir::new(&real_root).follow_links(false) {
            let entry = entry.map_err(|err| WatchError::Io(err.into()))?;
            let real = entry.path().to_path_buf();
            let logical = match real.strip_prefix(&real_root) {
                Ok(rel) => logical_root.join(rel),
                Err(_) => continue,
            };
            if entry.path_is_symlink() {
                let target = real.canonicalize()?;
                if !target.is_dir() {
                    continue;
                }
                insert_alias(&mut aliases, target.clone(), logical.clone())?;
                roots.push((target, logical));
            } else if entry.file_type().is_dir() {
                insert_alias(&mut aliases, real.clone(), logical)?;
                watcher.watch(&real, RecursiveMode::NonRecursive)?;
            } else if entry.file_type().is_file() {
                if let Ok(rel) = logical.strip_prefix(&root) {
                    initial.push(WatchEvent::created(rel.to_string_lossy()));
                }
            }
        }
    }
    debug!(root = %root.display(), dirs = aliases.len(), "watching");

    deliver(&mut initial, &filters, &mut handler);

    let token = CancellationToken::new();
    let child = token.clone();
    let tick = options.tick;
    let handle = tokio::spawn(async move {
        let mut buf: Vec<WatchEvent> = Vec::new();
        let mut terminal: Option<WatchError> = None;
        loop {
            tokio::select! {
                raw = raw_rx.recv() => match raw {
                    None => break,
                    Some(Ok(event)) => collect_raw(&mut buf, &event, &aliases, &root),
                    Some(Err(err)) => {
                        terminal = Some(WatchError::Notify(err));
                        break;
                    }
                },
                // Recreated on every new raw event, so the batch flushes only
                // after a full quiet period.
                _ = tokio::time::sleep(tick), if !buf.is_empty() => {
                    deliver(&mut buf, &filters, &mut handler);
                }
                _ = child.cancelled() => break,
            }
        }
        if !buf.is_empty() {
            deliver(&mut buf, &filters, &mut handler);
        }
        if let Some(err) = terminal {
            handler(WatchNotice::Error(err));
        }
        handler(WatchNotice::Closed);
    });

    Ok(WatchGuard {
        token,
        handle,
        _watcher: watcher,
    })
}

fn insert_alias(
    aliases: &mut HashMap<PathBuf, PathBuf>,
    real: PathBuf,
    logical: PathBuf,
) -> Result<(), WatchError> {
    if let Some(first) = aliases.get(&real) {
        if *first != logical {
            return Err(WatchError::DuplicateTarget {
                target: real.display().to_string(),
                first: first.display().to_string(),
                second: logical.display().to_string(),
            });
        }
    }
    aliases.insert(real, logical);
    Ok(())
}

fn collect_raw(
    buf: &mut Vec<WatchEvent>,
    event: &notify::Event,
    aliases: &HashMap<PathBuf, PathBuf>,
    root: &Path,
) {
    let op = match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => WatchOp::Created,
        EventKind::Remove(_) => WatchOp::Removed,
        _ => return,
    };
    for path in &event.paths {
        let (Some(dir), Some(file)) = (path.parent(), path.file_name()) else {
            continue;
        };
        let Some(logical_dir) = aliases.get(dir) else {
            continue;
        };
        let logical = logical_dir.join(file);
        let Ok(rel) = logical.strip_prefix(root) else {
            continue;
        };
        buf.push(WatchEvent {
            name: rel.to_string_lossy().into_owned(),
            op,
        });
    }
}

fn deliver(
    buf: &mut Vec<WatchEvent>,
    filters: &[WatchFilter],
    handler: &mut (dyn FnMut(WatchNotice) + Send),
) {
    let mut events = std::mem::take(buf);
    for filter in filters {
        events = filter(events);
        if events.is_empty() {
            return;
        }
    }
    handler(WatchNotice::Batch(events));
}
