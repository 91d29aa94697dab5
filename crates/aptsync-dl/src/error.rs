use aptsync_utils::error::FileSystemError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DownloadError {
    #[error("Invalid URL: {url}")]
    #[diagnostic(code(aptsync_dl::invalid_url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unsupported URL scheme `{scheme}` in {url}")]
    #[diagnostic(
        code(aptsync_dl::unsupported_scheme),
        help("Use an http://, https:// or file:// URL, or an absolute path")
    )]
    UnsupportedScheme { scheme: String, url: String },

    #[error(transparent)]
    #[diagnostic(
        code(aptsync_dl::network),
        help("Check your internet connection or try again later")
    )]
    Network(#[from] Box<ureq::Error>),

    #[error("HTTP {status}: {url}")]
    #[diagnostic(code(aptsync_dl::http_error))]
    HttpError { status: u16, url: String },

    #[error("Source file not found: {path}")]
    #[diagnostic(code(aptsync_dl::not_found))]
    NotFound { path: String },

    #[error("Error while {action}")]
    #[diagnostic(code(aptsync_dl::io))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(aptsync_dl::fs))]
    FileSystem(#[from] FileSystemError),

    #[error("Fetch cancelled")]
    #[diagnostic(code(aptsync_dl::cancelled))]
    Cancelled,

    #[error("Failed to fetch `{name}` from {url}")]
    #[diagnostic(code(aptsync_dl::resource))]
    Resource {
        name: String,
        url: String,
        #[source]
        source: Box<DownloadError>,
    },
}

impl DownloadError {
    /// True if this error, or the error it wraps, is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            DownloadError::Cancelled => true,
            DownloadError::Resource {
                source, ..
            } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<ureq::Error> for DownloadError {
    fn from(e: ureq::Error) -> Self {
        Self::Network(Box::new(e))
    }
}

/// Trait for adding context to IO errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, DownloadError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, DownloadError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            DownloadError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
