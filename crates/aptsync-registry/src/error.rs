//! Error types for the registry crate.

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while turning fetched index files into packages.
///
/// Every variant except [`RegistryError::IoError`] describes a structurally
/// invalid index document.
#[derive(Error, Diagnostic, Debug)]
pub enum RegistryError {
    #[error("Error while {action}: {source}")]
    #[diagnostic(code(aptsync_registry::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },

    #[error("Failed to decompress {resource}")]
    #[diagnostic(
        code(aptsync_registry::decompress),
        help("The index file may be truncated or not gzip-compressed")
    )]
    Decompress {
        resource: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{resource} is not valid UTF-8")]
    #[diagnostic(code(aptsync_registry::encoding))]
    InvalidEncoding { resource: String },

    #[error("{resource}:{line}: {reason}")]
    #[diagnostic(
        code(aptsync_registry::syntax),
        help("Index files are RFC 822 style stanzas separated by blank lines")
    )]
    Syntax {
        resource: String,
        line: usize,
        reason: String,
    },

    #[error("Stanza {stanza} in {resource} is missing required field `{field}`")]
    #[diagnostic(code(aptsync_registry::missing_field))]
    MissingField {
        resource: String,
        stanza: usize,
        field: &'static str,
    },

    #[error("Invalid value for `{field}` in {resource}: {value}")]
    #[diagnostic(code(aptsync_registry::invalid_field))]
    InvalidField {
        resource: String,
        field: &'static str,
        value: String,
    },

    #[error("Duplicate {kind} package `{key}` in {resource}")]
    #[diagnostic(
        code(aptsync_registry::duplicate_package),
        help("Each (package, version, maintainer) may appear only once per index")
    )]
    DuplicatePackage {
        kind: &'static str,
        key: String,
        resource: String,
    },

    #[error("Resource `{0}` has not been fetched")]
    #[diagnostic(code(aptsync_registry::not_fetched))]
    NotFetched(String),
}

/// A specialized Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Extension trait for adding context to I/O errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            RegistryError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
