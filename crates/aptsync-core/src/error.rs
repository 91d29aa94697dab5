//! Error types for aptsync-core.

use aptsync_config::error::ConfigError;
use aptsync_dl::error::DownloadError;
use aptsync_registry::RegistryError;
use aptsync_utils::error::{FileSystemError, HashError};
use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by a [`crate::store::UnitStore`].
#[derive(Error, Diagnostic, Debug)]
pub enum StoreError {
    #[error("Error while {action}")]
    #[diagnostic(code(aptsync::store::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unit inventory is corrupt")]
    #[diagnostic(
        code(aptsync::store::inventory),
        help("Restore units.json from a backup or remove the store to start over")
    )]
    Inventory(#[from] serde_json::Error),

    #[error("Duplicate {type_id} unit `{key}` in store")]
    #[diagnostic(
        code(aptsync::store::duplicate_unit),
        help("The store holds two units with the same identity key; remove one of them")
    )]
    DuplicateUnit { type_id: &'static str, key: String },

    #[error("Unit {0} not found in store")]
    #[diagnostic(code(aptsync::store::unit_not_found))]
    UnitNotFound(u64),

    #[error("Unit `{0}` has not been saved")]
    #[diagnostic(code(aptsync::store::unit_not_saved))]
    UnitNotSaved(String),

    #[error("Content file missing for unit: {path}")]
    #[diagnostic(code(aptsync::store::missing_content))]
    MissingContent { path: String },

    #[error("Invalid storage path `{0}`")]
    #[diagnostic(
        code(aptsync::store::invalid_path),
        help("Storage paths must be relative and must not contain `..`")
    )]
    InvalidPath(String),

    #[error(transparent)]
    #[diagnostic(code(aptsync::store::fs))]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(code(aptsync::store::hash))]
    Hash(#[from] HashError),
}

/// Errors of a sync run.
///
/// [`SyncError::Config`] is fatal before any phase starts; fetch and parse
/// errors are fatal in index retrieval; everything raised while importing a
/// single package is isolated to that package.
#[derive(Error, Diagnostic, Debug)]
pub enum SyncError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] DownloadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    #[diagnostic(
        code(aptsync::checksum),
        help("The mirror may be out of sync or the file was corrupted in transit")
    )]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Fetched resource `{0}` has no storage path")]
    #[diagnostic(code(aptsync::no_storage_path))]
    NoStoragePath(String),

    #[error(transparent)]
    #[diagnostic(code(aptsync::fs))]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(code(aptsync::hash))]
    Hash(#[from] HashError),

    #[error("Sync cancelled")]
    #[diagnostic(code(aptsync::cancelled))]
    Cancelled,
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            SyncError::Cancelled => true,
            SyncError::Fetch(err) => err.is_cancelled(),
            _ => false,
        }
    }
}

/// Trait for adding context to IO errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, StoreError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, StoreError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            StoreError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
