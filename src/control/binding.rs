//! Wires a control directory to a shared [`ControlSpec`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::spec::ControlSpec;
use crate::error::WatchError;
use crate::watch::{self, filters, WatchGuard, WatchNotice, WatchOptions};

/// Quiet period for control-directory batches. Long enough to ride out
/// editor temp-file-then-rename churn, short enough that commands feel
/// immediate.
pub const SPEC_TICK: Duration = Duration::from_millis(200);

/// Starts watching `dir` and applying control-file updates to `spec`.
///
/// Every event re-reads the named file and applies the body rules documented
/// on [`apply_body`](super::spec::apply_body); the event operation itself is
/// irrelevant. When the watch closes, the spec reverts to its baseline so a
/// later session starts clean.
pub fn watch_spec_dir(spec: Arc<ControlSpec>, dir: &Path) -> Result<WatchGuard, WatchError> {
    let baseline = spec.snapshot();
    let dir = dir.to_path_buf();
    watch::watch(
        WatchOptions {
            path: dir.clone(),
            tick: SPEC_TICK,
        },
        vec![filters::last_names, filters::lock_names, filters::dedup_names],
        move |notice| match notice {
            WatchNotice::Batch(events) => {
                for event in events {
                    let body = std::fs::read(dir.join(&event.name)).ok();
                    spec.apply(&event.name, body.as_deref(), &baseline);
                }
            }
            WatchNotice::Error(err) => {
                warn!(error = %err, "control watch failed; spec frozen");
            }
            WatchNotice::Closed => spec.restore(&baseline),
        },
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(700)).await;
    }

    #[tokio::test]
    async fn touch_style_write_activates_condition() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = Arc::new(ControlSpec::new());
        let guard = watch_spec_dir(spec.clone(), dir.path()).expect("watch");

        fs::write(dir.path().join("down"), b"\n").expect("write down");
        settle().await;
        assert!(spec.snapshot().down.is_some());

        guard.stop().await;
        // Closed reverts to baseline.
        assert!(spec.snapshot().down.is_none());
    }

    #[tokio::test]
    async fn create_then_delete_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = Arc::new(ControlSpec::new());
        let guard = watch_spec_dir(spec.clone(), dir.path()).expect("watch");

        // Both land in one debounce batch; by read time the file is gone.
        fs::write(dir.path().join("down"), b"").expect("write down");
        fs::remove_file(dir.path().join("down")).expect("remove down");
        settle().await;
        assert!(spec.snapshot().down.is_none());

        guard.stop().await;
    }

    #[tokio::test]
    async fn deletion_clears_an_active_condition() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = Arc::new(ControlSpec::new());
        let guard = watch_spec_dir(spec.clone(), dir.path()).expect("watch");

        fs::write(dir.path().join("stop"), b"\n").expect("write stop");
        settle().await;
        assert!(spec.snapshot().stop.is_some());

        fs::remove_file(dir.path().join("stop")).expect("remove stop");
        settle().await;
        assert!(spec.snapshot().stop.is_none());

        guard.stop().await;
    }

    #[tokio::test]
    async fn lock_rename_surfaces_as_single_update() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = Arc::new(ControlSpec::new());
        let guard = watch_spec_dir(spec.clone(), dir.path()).expect("watch");

        fs::write(dir.path().join("restart.lock"), b"\n").expect("write lock");
        fs::rename(
            dir.path().join("restart.lock"),
            dir.path().join("restart"),
        )
        .expect("rename lock");
        settle().await;
        assert!(spec.snapshot().restart.is_some());

        guard.stop().await;
    }
}
