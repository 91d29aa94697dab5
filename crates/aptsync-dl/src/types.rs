use std::path::PathBuf;

/// Fetch progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Starting { total: u64 },
    Chunk { current: u64, total: u64 },
    Complete { total: u64 },
}

/// One file to fetch.
///
/// `path` is `None` until a fetcher has written the file, after which it holds the
/// local path of the fetched copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Human readable name, used in progress and error reporting.
    pub name: String,
    /// Remote location.
    pub url: String,
    /// Where the fetched file should be written.
    pub destination: PathBuf,
    /// Repository-relative path the file is stored under, for package payloads.
    pub storage_path: Option<String>,
    /// Expected SHA-256 digest, when the index advertises one.
    pub sha256: Option<String>,
    /// Size advertised by the index, when known.
    pub size: Option<u64>,
    /// Local path after fetching.
    pub path: Option<PathBuf>,
}

impl Resource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            destination: destination.into(),
            storage_path: None,
            sha256: None,
            size: None,
            path: None,
        }
    }

    pub fn with_storage_path(mut self, storage_path: impl Into<String>) -> Self {
        self.storage_path = Some(storage_path.into());
        self
    }

    pub fn with_sha256(mut self, sha256: Option<String>) -> Self {
        self.sha256 = sha256;
        self
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn is_fetched(&self) -> bool {
        self.path.is_some()
    }
}
