use std::path::PathBuf;

use aptsync_config::error::ConfigError;
use aptsync_core::error::SyncError;
use aptsync_utils::error::PathError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    #[diagnostic(code(aptsync::path))]
    Path(#[from] PathError),

    #[error("Error while {action}")]
    #[diagnostic(code(aptsync::io))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid snapshot file {}", path.display())]
    #[diagnostic(
        code(aptsync::snapshot),
        help("Snapshot files are written by `aptsync sync --snapshot <file>`")
    )]
    Snapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid proxy `{proxy}`")]
    #[diagnostic(code(aptsync::proxy))]
    InvalidProxy {
        proxy: String,
        #[source]
        source: ureq::Error,
    },

    #[error("Invalid header `{0}`")]
    #[diagnostic(code(aptsync::header), help("Headers are given as `Name: value`"))]
    InvalidHeader(String),

    #[error("{failed} of {total} repositories failed to sync")]
    #[diagnostic(
        code(aptsync::sync_failed),
        help("Run `aptsync status <snapshot>` or re-run with -v for details")
    )]
    SyncFailed { failed: usize, total: usize },
}

pub type CliResult<T> = std::result::Result<T, CliError>;

/// Trait for adding context to IO errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> CliResult<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> CliResult<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            CliError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
