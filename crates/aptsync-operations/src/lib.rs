pub mod diff;
pub mod progress;
pub mod sync;

pub use diff::{ExistingUnits, SyncPlan};
pub use sync::{index_urls, repository_store_path, sync_repository, PackageSyncRun, SyncOptions};
