use crate::ProgressSnapshot;

/// All event types emitted during a sync run.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Full progress snapshot of a run.
    Progress {
        repo_id: String,
        snapshot: ProgressSnapshot,
    },
    /// A resource fetch is starting.
    FetchStarting { resource: String, total: u64 },
    /// Bytes received for a resource.
    FetchProgress {
        resource: String,
        current: u64,
        total: u64,
    },
    /// A resource has been fetched.
    FetchComplete { resource: String, total: u64 },
    /// A new package was persisted to the store.
    PackageImported { repo_id: String, key: String },
    /// A package failed to import; the run continues.
    PackageFailed {
        repo_id: String,
        key: String,
        error: String,
    },
    /// A package no longer advertised was removed from the store.
    PackageRemoved { repo_id: String, key: String },
}

