use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::{ConfigError, Result};

/// Importer configuration key for the repository base URL.
pub const KEY_URL: &str = "url";
/// Importer configuration key for the distribution name.
pub const KEY_DIST: &str = "dist";
/// Importer configuration key for the component name.
pub const KEY_COMPONENT: &str = "component";
/// Importer configuration key for the target architecture(s).
pub const KEY_ARCH: &str = "arch";
/// Importer configuration key controlling removal of packages no longer advertised.
pub const KEY_REMOVE_MISSING: &str = "remove_missing";

pub const DEFAULT_REMOVE_MISSING: bool = false;

/// URL schemes the fetch layer knows how to serve.
pub const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "file"];

/// A remote Debian repository to mirror.
///
/// One repository maps onto one sync run: a single `dist`/`component` pair,
/// fetched for every architecture listed in `arch`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Repository {
    /// Unique identifier of the repository.
    pub id: String,

    /// Base URL of the repository (the directory that contains `dists/`).
    pub url: String,

    /// Distribution name, e.g. `stable` or `bookworm`.
    pub dist: String,

    /// Component name, e.g. `main`.
    pub component: String,

    /// Target architecture, or list of architectures.
    #[serde(deserialize_with = "one_or_many")]
    pub arch: Vec<String>,

    /// Remove packages from the store that the remote no longer advertises.
    /// Default: false
    pub remove_missing: Option<bool>,

    /// Also fetch and import the source index (`Sources.gz`).
    /// Default: false
    pub sources: Option<bool>,

    /// Whether the repository is enabled.
    /// Default: true
    pub enabled: Option<bool>,
}

impl Repository {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        dist: impl Into<String>,
        component: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            dist: dist.into(),
            component: component.into(),
            arch: vec![arch.into()],
            remove_missing: None,
            sources: None,
            enabled: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn remove_missing(&self) -> bool {
        self.remove_missing.unwrap_or(DEFAULT_REMOVE_MISSING)
    }

    pub fn sources(&self) -> bool {
        self.sources.unwrap_or(false)
    }

    /// Base URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Returns the URL scheme, treating a bare absolute path as `file`.
    pub fn scheme(&self) -> Result<String> {
        if self.url.starts_with('/') {
            return Ok("file".to_string());
        }
        Url::parse(&self.url)
            .map(|url| url.scheme().to_string())
            .map_err(|_| {
                ConfigError::InvalidRepositoryUrl {
                    repo: self.id.clone(),
                    url: self.url.clone(),
                }
            })
    }

    /// Checks that every importer key is present and the URL is usable.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::EmptyRepositoryId);
        }

        let required = [
            (KEY_URL, &self.url),
            (KEY_DIST, &self.dist),
            (KEY_COMPONENT, &self.component),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    repo: self.id.clone(),
                    field,
                });
            }
        }

        if self.arch.is_empty() || self.arch.iter().any(|a| a.trim().is_empty()) {
            return Err(ConfigError::MissingField {
                repo: self.id.clone(),
                field: KEY_ARCH,
            });
        }

        let scheme = self.scheme()?;
        if !SUPPORTED_SCHEMES.contains(&scheme.as_str()) {
            return Err(ConfigError::UnsupportedScheme {
                repo: self.id.clone(),
                scheme,
            });
        }

        Ok(())
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {}/{} [{}])",
            self.id,
            self.base_url(),
            self.dist,
            self.component,
            self.arch.join(", ")
        )
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Repository {
        Repository::new(
            "debian",
            "http://deb.example.org/debian/",
            "stable",
            "main",
            "amd64",
        )
    }

    #[test]
    fn test_defaults() {
        let repo = repo();
        assert!(repo.is_enabled());
        assert!(!repo.remove_missing());
        assert!(!repo.sources());
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        assert_eq!(repo().base_url(), "http://deb.example.org/debian");
    }

    #[test]
    fn test_validate_ok() {
        assert!(repo().validate().is_ok());
    }

    #[test]
    fn test_validate_missing_dist() {
        let mut repo = repo();
        repo.dist = String::new();
        assert!(matches!(
            repo.validate(),
            Err(ConfigError::MissingField { field: KEY_DIST, .. })
        ));
    }

    #[test]
    fn test_validate_missing_arch() {
        let mut repo = repo();
        repo.arch.clear();
        assert!(matches!(
            repo.validate(),
            Err(ConfigError::MissingField { field: KEY_ARCH, .. })
        ));
    }

    #[test]
    fn test_validate_empty_id() {
        let mut repo = repo();
        repo.id = "  ".into();
        assert!(matches!(
            repo.validate(),
            Err(ConfigError::EmptyRepositoryId)
        ));
    }

    #[test]
    fn test_validate_unsupported_scheme() {
        let mut repo = repo();
        repo.url = "ftp://ftp.example.org/debian".into();
        assert!(matches!(
            repo.validate(),
            Err(ConfigError::UnsupportedScheme { ref scheme, .. }) if scheme == "ftp"
        ));
    }

    #[test]
    fn test_bare_path_is_file_scheme() {
        let mut repo = repo();
        repo.url = "/srv/mirror/debian".into();
        assert_eq!(repo.scheme().unwrap(), "file");
        assert!(repo.validate().is_ok());
    }

    #[test]
    fn test_invalid_url() {
        let mut repo = repo();
        repo.url = "not a url".into();
        assert!(matches!(
            repo.validate(),
            Err(ConfigError::InvalidRepositoryUrl { .. })
        ));
    }

    #[test]
    fn test_arch_accepts_string_or_list() {
        let single: Repository = toml::from_str(
            r#"
            id = "a"
            url = "http://x"
            dist = "stable"
            component = "main"
            arch = "amd64"
            "#,
        )
        .unwrap();
        assert_eq!(single.arch, vec!["amd64"]);

        let many: Repository = toml::from_str(
            r#"
            id = "a"
            url = "http://x"
            dist = "stable"
            component = "main"
            arch = ["amd64", "arm64"]
            remove_missing = true
            "#,
        )
        .unwrap();
        assert_eq!(many.arch, vec!["amd64", "arm64"]);
        assert!(many.remove_missing());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            repo().to_string(),
            "debian (http://deb.example.org/debian stable/main [amd64])"
        );
    }
}
