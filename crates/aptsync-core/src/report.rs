use std::{collections::BTreeMap, error::Error};

use aptsync_events::{
    EventSinkHandle, IndexSection, PackagesSection, PhaseState, ProgressSnapshot,
    PublishingSection, SyncEvent,
};
use aptsync_registry::PackageKey;
use aptsync_utils::error::format_error_chain;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Mutable progress record of one sync run.
///
/// Every call to [`SyncProgressReport::update_progress`] pushes a full
/// [`ProgressSnapshot`] to the sink, if any. A report rebuilt from a snapshot
/// with [`SyncProgressReport::from_progress_snapshot`] has no sink and is
/// only good for reading.
pub struct SyncProgressReport {
    repo_id: String,
    sink: Option<EventSinkHandle>,
    pub index: IndexSection,
    pub packages: PackagesSection,
    pub publishing: PublishingSection,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// True when the index phase succeeded and the import phase either
    /// succeeded or had nothing to do.
    pub success: bool,
    pub summary: SyncSummary,
    pub details: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Index plus import seconds; `-1` if either phase has no elapsed time.
    pub total_execution_time: i64,
}

impl SyncProgressReport {
    pub fn new(repo_id: impl Into<String>, sink: Option<EventSinkHandle>) -> Self {
        Self {
            repo_id: repo_id.into(),
            sink,
            index: IndexSection::default(),
            packages: PackagesSection::default(),
            publishing: PublishingSection::default(),
        }
    }

    pub fn from_progress_snapshot(repo_id: impl Into<String>, snapshot: ProgressSnapshot) -> Self {
        Self {
            repo_id: repo_id.into(),
            sink: None,
            index: snapshot.index,
            packages: snapshot.packages,
            publishing: snapshot.publishing,
        }
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn build_progress_report(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            index: self.index.clone(),
            packages: self.packages.clone(),
            publishing: self.publishing.clone(),
        }
    }

    /// Pushes the current snapshot to the sink.
    pub fn update_progress(&self) {
        trace!(
            repo = %self.repo_id,
            index = %self.index.state,
            packages = %self.packages.state,
            "progress update"
        );
        self.emit(SyncEvent::Progress {
            repo_id: self.repo_id.clone(),
            snapshot: self.build_progress_report(),
        });
    }

    /// Forwards an event to the sink without touching the report.
    pub fn emit(&self, event: SyncEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(event);
        }
    }

    /// Marks the index phase failed.
    ///
    /// `message` is the phase-level summary; `error` keeps the top-level
    /// message and `traceback` the full cause chain.
    pub fn fail_index(
        &mut self,
        message: &str,
        error: &(dyn Error + 'static),
        execution_time: u64,
    ) {
        self.index.state = PhaseState::Failed;
        self.index.execution_time = Some(execution_time);
        self.index.error_message = Some(message.to_string());
        self.index.error = Some(error.to_string());
        self.index.traceback = Some(format_error_chain(error));
    }

    /// Marks the import phase failed.
    pub fn fail_packages(
        &mut self,
        message: &str,
        error: &(dyn Error + 'static),
        execution_time: u64,
    ) {
        self.packages.state = PhaseState::Failed;
        self.packages.execution_time = Some(execution_time);
        self.packages.error_message = Some(message.to_string());
        self.packages.error = Some(error.to_string());
        self.packages.traceback = Some(format_error_chain(error));
    }

    /// Sets the import totals once the diff is known.
    pub fn set_package_counts(&mut self, total: u64) {
        self.packages.total_count = Some(total);
        self.packages.finished_count = Some(0);
        self.packages.error_count = Some(0);
    }

    pub fn add_finished_package(&mut self, key: &PackageKey) {
        self.packages.finished_count = Some(self.packages.finished_count.unwrap_or(0) + 1);
        self.emit(SyncEvent::PackageImported {
            repo_id: self.repo_id.clone(),
            key: key.to_string(),
        });
    }

    /// Records an isolated import failure; `finished_count` is left alone.
    pub fn add_failed_package(&mut self, key: &PackageKey, error: &(dyn Error + 'static)) {
        let message = format_error_chain(error);
        self.packages.error_count = Some(self.packages.error_count.unwrap_or(0) + 1);
        self.packages
            .individual_errors
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), message.clone());
        self.emit(SyncEvent::PackageFailed {
            repo_id: self.repo_id.clone(),
            key: key.to_string(),
            error: message,
        });
    }

    pub fn add_removed_package(&mut self, key: &PackageKey) {
        self.packages.removed_count = Some(self.packages.removed_count.unwrap_or(0) + 1);
        self.emit(SyncEvent::PackageRemoved {
            repo_id: self.repo_id.clone(),
            key: key.to_string(),
        });
    }

    pub fn add_failed_removal(&mut self, key: &PackageKey, error: &(dyn Error + 'static)) {
        self.packages
            .removal_errors
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), format_error_chain(error));
    }

    pub fn build_final_report(&self) -> SyncReport {
        // An import phase that never started after a successful index means
        // nothing was advertised.
        let success = self.index.state == PhaseState::Success
            && matches!(
                self.packages.state,
                PhaseState::Success | PhaseState::NotStarted
            );

        let total_execution_time = match (self.index.execution_time, self.packages.execution_time) {
            (Some(index), Some(packages)) => (index + packages) as i64,
            _ => -1,
        };

        SyncReport {
            success,
            summary: SyncSummary {
                total_execution_time,
            },
            details: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{fmt, sync::Arc};

    use aptsync_events::CollectorSink;

    use super::*;

    #[derive(Debug)]
    struct Outer(Inner);

    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("fetch failed")
        }
    }

    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("connection refused")
        }
    }

    impl Error for Outer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    impl Error for Inner {}

    #[test]
    fn test_new_report_is_not_started() {
        let report = SyncProgressReport::new("debian", None);
        let snapshot = report.build_progress_report();
        assert_eq!(snapshot.index.state, PhaseState::NotStarted);
        assert_eq!(snapshot.packages.state, PhaseState::NotStarted);
        assert_eq!(snapshot.packages.total_count, None);
        assert!(!report.build_final_report().success);

        let mut report = SyncProgressReport::new("debian", None);
        report.index.state = PhaseState::Running;
        assert!(!report.build_final_report().success);
    }

    #[test]
    fn test_update_progress_pushes_snapshot() {
        let sink = Arc::new(CollectorSink::default());
        let mut report = SyncProgressReport::new("debian", Some(sink.clone()));

        report.index.state = PhaseState::Running;
        report.update_progress();
        report.index.state = PhaseState::Success;
        report.update_progress();

        let snapshots = sink.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].index.state, PhaseState::Running);
        assert_eq!(snapshots[1].index.state, PhaseState::Success);
    }

    #[test]
    fn test_add_failed_package() {
        let mut report = SyncProgressReport::new("debian", None);
        report.set_package_counts(2);
        report.add_failed_package(&PackageKey::from("B-2.0-bob"), &Outer(Inner));

        assert_eq!(report.packages.error_count, Some(1));
        assert_eq!(report.packages.finished_count, Some(0));
        let errors = report.packages.individual_errors.as_ref().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors["B-2.0-bob"].starts_with("fetch failed"));
        assert!(errors["B-2.0-bob"].contains("connection refused"));
    }

    #[test]
    fn test_fail_index_records_detail() {
        let mut report = SyncProgressReport::new("debian", None);
        report.fail_index("Error downloading resources", &Outer(Inner), 3);

        assert_eq!(report.index.state, PhaseState::Failed);
        assert_eq!(report.index.execution_time, Some(3));
        assert_eq!(
            report.index.error_message.as_deref(),
            Some("Error downloading resources")
        );
        assert_eq!(report.index.error.as_deref(), Some("fetch failed"));
        assert!(report.index
            .traceback
            .as_ref()
            .unwrap()
            .contains("caused by: connection refused"));
        assert!(!report.build_final_report().success);
    }

    #[test]
    fn test_reconstruct_from_snapshot() {
        let mut report = SyncProgressReport::new("debian", Some(Arc::new(CollectorSink::default())));
        report.index.state = PhaseState::Success;
        report.index.execution_time = Some(1);
        report.packages.state = PhaseState::Running;
        report.set_package_counts(3);
        report.add_finished_package(&PackageKey::from("A-1.0-alice"));
        report.add_failed_package(&PackageKey::from("B-2.0-bob"), &Inner);
        report.add_removed_package(&PackageKey::from("C-1.0-carol"));

        let snapshot = report.build_progress_report();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored = SyncProgressReport::from_progress_snapshot(
            "debian",
            serde_json::from_str(&json).unwrap(),
        );

        assert_eq!(restored.build_progress_report(), snapshot);
        assert_eq!(restored.repo_id(), "debian");
    }

    #[test]
    fn test_final_report() {
        let mut report = SyncProgressReport::new("debian", None);
        report.index.state = PhaseState::Success;
        report.index.execution_time = Some(2);

        let final_report = report.build_final_report();
        assert!(final_report.success);
        assert_eq!(final_report.summary.total_execution_time, -1);

        report.packages.state = PhaseState::Failed;
        assert!(!report.build_final_report().success);

        report.packages.state = PhaseState::Success;
        report.packages.execution_time = Some(5);
        report.add_failed_package(&PackageKey::from("B-2.0-bob"), &Inner);

        let final_report = report.build_final_report();
        assert!(final_report.success);
        assert_eq!(final_report.summary.total_execution_time, 7);
        assert!(final_report.details.is_empty());
    }

    #[test]
    fn test_item_events_reach_sink() {
        let sink = Arc::new(CollectorSink::default());
        let mut report = SyncProgressReport::new("debian", Some(sink.clone()));
        report.set_package_counts(1);
        report.add_finished_package(&PackageKey::from("A-1.0-alice"));
        report.add_removed_package(&PackageKey::from("C-1.0-carol"));

        let events = sink.events();
        assert!(matches!(&events[0], SyncEvent::PackageImported { key, .. } if key == "A-1.0-alice"));
        assert!(matches!(&events[1], SyncEvent::PackageRemoved { key, .. } if key == "C-1.0-carol"));
        assert_eq!(report.packages.removed_count, Some(1));
    }
}
