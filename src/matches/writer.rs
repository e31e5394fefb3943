//! Atomic gzip artifact writes with out-of-band sync metadata.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

/// Extended attribute consumed by the artifact sync tooling.
pub const META_XATTR: &str = "user.s3sync.meta";

/// Sync-side metadata attached to every artifact.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SyncMeta {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content_disposition: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content_language: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content_encoding: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl SyncMeta {
    /// Standard metadata for a session's JSON artifacts.
    ///
    /// Session names of the form `<assoc> <team0> vs <team1>` for a known
    /// association also carry the matchup in the metadata map.
    pub fn for_session(session: &str) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("lobby".to_string(), session.to_string());
        let fields: Vec<&str> = session.split_whitespace().collect();
        if fields.len() == 4 && matches!(fields[0], "VRML" | "VXL") {
            metadata.insert("assoc".to_string(), fields[0].to_string());
            metadata.insert("team0".to_string(), fields[1].to_string());
            metadata.insert("team1".to_string(), fields[3].to_string());
        }
        Self {
            content_type: "application/json".to_string(),
            content_disposition: "inline".to_string(),
            content_language: "en-US".to_string(),
            content_encoding: "gzip".to_string(),
            metadata,
        }
    }
}

/// Serializes `value` as gzipped JSON at `file` via lock-then-rename.
///
/// The sync metadata attribute goes onto the lock file before the rename, so
/// a partially written or unattributed artifact is never visible under the
/// final name.
pub(crate) fn write_gz_json<T: Serialize>(
    value: &T,
    meta: &SyncMeta,
    file: &Path,
) -> io::Result<()> {
    let lock = lock_name(file);
    let out = File::create(&lock)?;
    let mut gz = GzEncoder::new(out, Compression::default());
    let body = serde_json::to_vec(value)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    gz.write_all(&body)?;
    gz.finish()?;
    set_meta_attr(&lock, meta);
    fs::rename(&lock, file)
}

fn lock_name(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(unix)]
fn set_meta_attr(path: &Path, meta: &SyncMeta) {
    let Ok(body) = serde_json::to_vec(meta) else {
        return;
    };
    if let Err(err) = xattr::set(path, META_XATTR, &body) {
        tracing::debug!(error = %err, path = %path.display(), "xattr skipped");
    }
}

#[cfg(not(unix))]
fn set_meta_attr(_path: &Path, _meta: &SyncMeta) {}
