use aptsync_utils::error::{FileSystemError, PathError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(aptsync_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(aptsync_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Repository `{repo}` is missing a value for `{field}`")]
    #[diagnostic(
        code(aptsync_config::missing_field),
        help("Every repository needs url, dist, component and at least one arch")
    )]
    MissingField { repo: String, field: &'static str },

    #[error("Repository entry has an empty id")]
    #[diagnostic(
        code(aptsync_config::empty_id),
        help("Give each [[repositories]] entry a unique `id`")
    )]
    EmptyRepositoryId,

    #[error("Duplicate repository id: {0}")]
    #[diagnostic(
        code(aptsync_config::duplicate_repo),
        help("Each repository must have a unique id")
    )]
    DuplicateRepositoryId(String),

    #[error("Invalid repository URL `{url}` for `{repo}`")]
    #[diagnostic(code(aptsync_config::invalid_repository_url))]
    InvalidRepositoryUrl { repo: String, url: String },

    #[error("Unsupported URL scheme `{scheme}` for repository `{repo}`")]
    #[diagnostic(
        code(aptsync_config::unsupported_scheme),
        help("Supported schemes are http, https and file (or a plain absolute path)")
    )]
    UnsupportedScheme { repo: String, scheme: String },

    #[error("parallel_limit must be at least 1")]
    #[diagnostic(code(aptsync_config::invalid_parallel_limit))]
    InvalidParallelLimit,

    #[error("Repository not found: {0}")]
    #[diagnostic(
        code(aptsync_config::repository_not_found),
        help("Run `aptsync repos` to list configured repositories")
    )]
    RepositoryNotFound(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(aptsync_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(aptsync_config::path))]
    Path(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(code(aptsync_config::fs))]
    FileSystem(#[from] FileSystemError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
