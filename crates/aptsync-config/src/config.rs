use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{LazyLock, RwLock},
};

use aptsync_utils::path::{resolve_path, xdg_config_home, xdg_data_home};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{ConfigError, Result},
    repository::Repository,
};

pub const DEFAULT_PARALLEL_LIMIT: usize = 1;
pub const DEFAULT_VERIFY_CHECKSUMS: bool = true;

/// Application's configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Root of the unit store (content files and inventory).
    /// Default: $APTSYNC_ROOT/store
    pub store_path: Option<String>,

    /// Working directory for fetched index and package files.
    /// Default: $APTSYNC_ROOT/cache
    pub cache_path: Option<String>,

    /// Number of packages imported concurrently. 1 imports serially.
    /// Default: 1
    pub parallel_limit: Option<usize>,

    /// Verify fetched package files against the index SHA-256 sums.
    /// Default: true
    pub verify_checksums: Option<bool>,

    /// List of configured repositories.
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

pub static CONFIG: LazyLock<RwLock<Option<Config>>> = LazyLock::new(|| RwLock::new(None));

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var("APTSYNC_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("aptsync").join("config.toml"),
    })
});

/// Overrides the configuration file location, e.g. from `--config`.
pub fn set_config_path(path: PathBuf) {
    let mut guard = CONFIG_PATH.write().unwrap_or_else(|e| e.into_inner());
    *guard = path;
}

pub fn config_path() -> PathBuf {
    CONFIG_PATH
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .to_path_buf()
}

/// Loads the configuration file and stores it as the global config.
pub fn init() -> Result<()> {
    let config = Config::new()?;
    let mut global_config = CONFIG.write().unwrap_or_else(|e| e.into_inner());
    *global_config = Some(config);
    Ok(())
}

/// Returns the global config, falling back to defaults when [`init`] was never called.
pub fn get_config() -> Config {
    {
        let guard = CONFIG.read().unwrap_or_else(|e| e.into_inner());
        if let Some(config) = guard.as_ref() {
            return config.clone();
        }
    }

    let mut guard = CONFIG.write().unwrap_or_else(|e| e.into_inner());
    guard.get_or_insert_with(Config::default_config).clone()
}

fn aptsync_root() -> String {
    std::env::var("APTSYNC_ROOT")
        .unwrap_or_else(|_| format!("{}/aptsync", xdg_data_home().display()))
}

impl Config {
    pub fn default_config() -> Self {
        let root = aptsync_root();

        Self {
            store_path: Some(format!("{root}/store")),
            cache_path: Some(format!("{root}/cache")),
            parallel_limit: Some(DEFAULT_PARALLEL_LIMIT),
            verify_checksums: Some(DEFAULT_VERIFY_CHECKSUMS),
            repositories: Vec::new(),
        }
    }

    /// Creates a new configuration by loading it from the configuration file.
    /// If the configuration file is not found, it uses the default configuration.
    pub fn new() -> Result<Self> {
        Self::load(config_path())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config = match fs::read_to_string(path) {
            Ok(content) => {
                debug!(path = %path.display(), "loading configuration");
                toml::from_str(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no configuration file, using defaults");
                Self::default_config()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;

        Ok(config)
    }

    /// Fills defaults and validates every repository.
    ///
    /// Any violation here is fatal: no sync phase may start with a bad config.
    pub fn resolve(&mut self) -> Result<()> {
        let root = aptsync_root();
        self.store_path
            .get_or_insert_with(|| format!("{root}/store"));
        self.cache_path
            .get_or_insert_with(|| format!("{root}/cache"));
        self.verify_checksums.get_or_insert(DEFAULT_VERIFY_CHECKSUMS);

        match self.parallel_limit {
            Some(0) => return Err(ConfigError::InvalidParallelLimit),
            None => self.parallel_limit = Some(DEFAULT_PARALLEL_LIMIT),
            Some(_) => {}
        }

        let mut seen_repos = HashSet::new();
        for repo in &mut self.repositories {
            repo.validate()?;
            if !seen_repos.insert(repo.id.clone()) {
                return Err(ConfigError::DuplicateRepositoryId(repo.id.clone()));
            }
            repo.enabled.get_or_insert(true);
        }

        Ok(())
    }

    pub fn get_store_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("APTSYNC_STORE") {
            return Ok(resolve_path(&env_path)?);
        }
        match &self.store_path {
            Some(store_path) => Ok(resolve_path(store_path)?),
            None => Ok(resolve_path(&format!("{}/store", aptsync_root()))?),
        }
    }

    pub fn get_cache_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("APTSYNC_CACHE") {
            return Ok(resolve_path(&env_path)?);
        }
        match &self.cache_path {
            Some(cache_path) => Ok(resolve_path(cache_path)?),
            None => Ok(resolve_path(&format!("{}/cache", aptsync_root()))?),
        }
    }

    pub fn parallel_limit(&self) -> usize {
        self.parallel_limit.unwrap_or(DEFAULT_PARALLEL_LIMIT).max(1)
    }

    pub fn verify_checksums(&self) -> bool {
        self.verify_checksums.unwrap_or(DEFAULT_VERIFY_CHECKSUMS)
    }

    /// Looks up an enabled repository by id.
    pub fn get_repository(&self, id: &str) -> Result<&Repository> {
        self.repositories
            .iter()
            .find(|repo| repo.id == id && repo.is_enabled())
            .ok_or_else(|| ConfigError::RepositoryNotFound(id.to_string()))
    }

    pub fn enabled_repositories(&self) -> impl Iterator<Item = &Repository> {
        self.repositories.iter().filter(|repo| repo.is_enabled())
    }

    pub fn save(&self) -> Result<()> {
        let config_path = config_path();
        let serialized = toml::to_string_pretty(self)?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&config_path, serialized)?;
        info!("Configuration saved to {}", config_path.display());
        Ok(())
    }
}
