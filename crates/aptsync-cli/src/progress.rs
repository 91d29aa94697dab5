use std::{
    collections::HashMap,
    sync::{mpsc::Receiver, Arc, LazyLock},
    time::Duration,
};

use aptsync_events::{PackagesSection, PhaseState, ProgressSnapshot, SyncEvent};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use nu_ansi_term::Color::Cyan;

use crate::utils::{progress_enabled, Colored};

/// Shared MultiProgress instance for suspend/stop from other modules.
static MULTI: LazyLock<Arc<MultiProgress>> = LazyLock::new(|| Arc::new(MultiProgress::new()));

/// Pause progress display, run the closure, then resume.
pub fn suspend<F: FnOnce()>(f: F) {
    MULTI.suspend(f);
}

/// Stop and clear all progress bars.
pub fn stop() {
    MULTI.clear().ok();
}

/// Owns the background progress thread started by [`spawn_event_handler`].
///
/// Every sender of the channel must be dropped before calling
/// [`finish`](ProgressGuard::finish), otherwise the join blocks forever.
pub struct ProgressGuard {
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ProgressGuard {
    /// Wait for the handler thread to drain remaining events.
    pub fn finish(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

fn download_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} {prefix}  {wide_bar:.cyan/dim}  {bytes}/{total_bytes}  {bytes_per_sec}  {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━━─")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn create_spinner(msg: String) -> ProgressBar {
    let pb = if progress_enabled() {
        MULTI.add(ProgressBar::new_spinner())
    } else {
        MULTI.add(ProgressBar::hidden())
    };
    pb.set_style(spinner_style());
    pb.set_message(msg);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn create_download_bar(resource: &str, total: u64) -> ProgressBar {
    let pb = if progress_enabled() {
        MULTI.add(ProgressBar::new(total))
    } else {
        MULTI.add(ProgressBar::hidden())
    };
    pb.set_style(download_style());
    pb.set_prefix(file_label(resource));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn file_label(resource: &str) -> String {
    let name = resource.rsplit('/').next().unwrap_or(resource);
    Colored(Cyan, name).to_string()
}

/// One-line summary of a repository's progress.
pub fn status_line(repo_id: &str, snapshot: &ProgressSnapshot) -> String {
    match snapshot.index.state {
        PhaseState::NotStarted | PhaseState::Running => {
            return format!("{repo_id}: retrieving index files");
        }
        PhaseState::Failed => return format!("{repo_id}: index retrieval failed"),
        _ => {}
    }

    match snapshot.packages.state {
        PhaseState::NotStarted => format!("{repo_id}: index retrieved"),
        PhaseState::Running => format!("{repo_id}: importing {}", package_counts(&snapshot.packages)),
        PhaseState::Failed => format!("{repo_id}: import failed"),
        PhaseState::Success | PhaseState::Skipped => {
            format!("{repo_id}: imported {}", package_counts(&snapshot.packages))
        }
    }
}

fn package_counts(packages: &PackagesSection) -> String {
    let done = packages.finished_count.unwrap_or(0) + packages.error_count.unwrap_or(0);
    let mut counts = format!("{done}/{}", packages.total_count.unwrap_or(0));
    if let Some(errors) = packages.error_count.filter(|n| *n > 0) {
        counts.push_str(&format!(" ({errors} failed)"));
    }
    counts
}

/// Spawn a background thread that maps [`SyncEvent`]s to indicatif progress bars.
///
/// Each fetched resource gets a byte bar for the duration of its transfer;
/// each repository gets one spinner that follows its progress snapshots.
pub fn spawn_event_handler(receiver: Receiver<SyncEvent>) -> ProgressGuard {
    let handle = std::thread::spawn(move || {
        let mut downloads: HashMap<String, ProgressBar> = HashMap::new();
        let mut repos: HashMap<String, ProgressBar> = HashMap::new();

        while let Ok(event) = receiver.recv() {
            match event {
                SyncEvent::FetchStarting {
                    resource,
                    total,
                } => {
                    let pb = create_download_bar(&resource, total);
                    if let Some(old) = downloads.insert(resource, pb) {
                        old.finish_and_clear();
                    }
                }
                SyncEvent::FetchProgress {
                    resource,
                    current,
                    total,
                } => {
                    if let Some(pb) = downloads.get(&resource) {
                        if total > 0 {
                            pb.set_length(total);
                        }
                        pb.set_position(current);
                    }
                }
                SyncEvent::FetchComplete {
                    resource, ..
                } => {
                    if let Some(pb) = downloads.remove(&resource) {
                        pb.finish_and_clear();
                    }
                }
                SyncEvent::Progress {
                    repo_id,
                    snapshot,
                } => {
                    let msg = status_line(&repo_id, &snapshot);
                    let pb = repos
                        .entry(repo_id)
                        .or_insert_with(|| create_spinner(msg.clone()));
                    pb.set_message(msg);
                }
                SyncEvent::PackageImported {
                    ..
                }
                | SyncEvent::PackageFailed {
                    ..
                }
                | SyncEvent::PackageRemoved {
                    ..
                } => {}
            }
        }

        for (_, pb) in downloads.into_iter().chain(repos) {
            pb.finish_and_clear();
        }
    });

    ProgressGuard {
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_follows_phases() {
        let mut snapshot = ProgressSnapshot::default();
        assert_eq!(status_line("debian", &snapshot), "debian: retrieving index files");

        snapshot.index.state = PhaseState::Success;
        snapshot.packages.state = PhaseState::Running;
        snapshot.packages.total_count = Some(4);
        snapshot.packages.finished_count = Some(2);
        snapshot.packages.error_count = Some(1);
        assert_eq!(status_line("debian", &snapshot), "debian: importing 3/4 (1 failed)");

        snapshot.packages.state = PhaseState::Success;
        snapshot.packages.error_count = Some(0);
        assert_eq!(status_line("debian", &snapshot), "debian: imported 2/4");

        snapshot.index.state = PhaseState::Failed;
        assert_eq!(status_line("debian", &snapshot), "debian: index retrieval failed");
    }

    #[test]
    fn test_file_label_uses_file_name() {
        crate::utils::set_color(false);
        assert_eq!(file_label("dists/stable/main/binary-amd64/Packages.gz"), "Packages.gz");
    }
}
