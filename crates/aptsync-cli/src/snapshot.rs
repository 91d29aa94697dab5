use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use aptsync_events::{EventSink, EventSinkHandle, ProgressSnapshot, SyncEvent};
use tracing::warn;

use crate::error::{CliError, CliResult, ErrorContext};

/// Latest snapshot of each repository, as stored in a snapshot file.
pub type SnapshotFile = BTreeMap<String, ProgressSnapshot>;

/// Sink that keeps the latest snapshot per repository on disk and forwards
/// every event to an inner sink.
pub struct SnapshotSink {
    path: PathBuf,
    inner: EventSinkHandle,
    latest: Mutex<SnapshotFile>,
}

impl SnapshotSink {
    pub fn new(path: impl Into<PathBuf>, inner: EventSinkHandle) -> Self {
        Self {
            path: path.into(),
            inner,
            latest: Mutex::new(SnapshotFile::new()),
        }
    }

    fn record(&self, repo_id: &str, snapshot: &ProgressSnapshot) -> CliResult<()> {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        latest.insert(repo_id.to_string(), snapshot.clone());
        write_snapshots(&self.path, &latest)
    }
}

impl EventSink for SnapshotSink {
    fn emit(&self, event: SyncEvent) {
        if let SyncEvent::Progress {
            repo_id,
            snapshot,
        } = &event
        {
            if let Err(err) = self.record(repo_id, snapshot) {
                warn!(path = %self.path.display(), error = %err, "failed to write snapshot");
            }
        }
        self.inner.emit(event);
    }
}

fn write_snapshots(path: &Path, snapshots: &SnapshotFile) -> CliResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(snapshots).map_err(|err| {
        CliError::Snapshot {
            path: path.to_path_buf(),
            source: err,
        }
    })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))
}

pub fn load_snapshots(path: &Path) -> CliResult<SnapshotFile> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).map_err(|err| {
        CliError::Snapshot {
            path: path.to_path_buf(),
            source: err,
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aptsync_events::{CollectorSink, PhaseState};
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_keeps_latest_snapshot_per_repo() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state/snapshot.json");
        let collector = Arc::new(CollectorSink::default());
        let sink = SnapshotSink::new(&path, collector.clone());

        let mut snapshot = ProgressSnapshot::default();
        snapshot.index.state = PhaseState::Running;
        sink.emit(SyncEvent::Progress {
            repo_id: "debian".into(),
            snapshot: snapshot.clone(),
        });
        snapshot.index.state = PhaseState::Success;
        sink.emit(SyncEvent::Progress {
            repo_id: "debian".into(),
            snapshot: snapshot.clone(),
        });
        sink.emit(SyncEvent::Progress {
            repo_id: "ubuntu".into(),
            snapshot: ProgressSnapshot::default(),
        });

        let loaded = load_snapshots(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["debian"], snapshot);
        assert_eq!(loaded["ubuntu"].index.state, PhaseState::NotStarted);
        assert_eq!(collector.len(), 3);
    }

    #[test]
    fn test_invalid_snapshot_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load_snapshots(&path),
            Err(CliError::Snapshot { .. })
        ));
        assert!(matches!(
            load_snapshots(&dir.path().join("missing.json")),
            Err(CliError::IoError { .. })
        ));
    }
}
