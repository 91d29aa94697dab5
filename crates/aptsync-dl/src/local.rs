use std::{
    fs::File,
    path::{Path, PathBuf},
};

use tracing::debug;
use url::Url;

use crate::{
    cancel::CancellationToken,
    error::{DownloadError, ErrorContext, Result},
    fetcher::{write_stream, Fetcher},
    types::{Progress, Resource},
};

/// Serves resources from a repository on the local filesystem.
///
/// Accepts `file://` URLs and bare absolute paths. Files are copied to their
/// destination so callers see the same layout as for remote fetches.
pub struct LocalFetcher {
    cancel: CancellationToken,
}

impl LocalFetcher {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
        }
    }

    fn source_path(url: &str) -> Result<PathBuf> {
        if url.starts_with('/') {
            return Ok(PathBuf::from(url));
        }

        let parsed = Url::parse(url).map_err(|err| {
            DownloadError::InvalidUrl {
                url: url.to_string(),
                source: err,
            }
        })?;

        parsed.to_file_path().map_err(|_| {
            DownloadError::NotFound {
                path: url.to_string(),
            }
        })
    }
}

impl Fetcher for LocalFetcher {
    fn fetch(&self, resource: &Resource, on_progress: &dyn Fn(Progress)) -> Result<PathBuf> {
        let source = Self::source_path(&resource.url)?;
        if !source.is_file() {
            return Err(DownloadError::NotFound {
                path: source.display().to_string(),
            });
        }

        debug!(source = %source.display(), "copying local resource");
        let total = file_len(&source)?;
        let mut file =
            File::open(&source).with_context(|| format!("opening {}", source.display()))?;
        write_stream(&mut file, &resource.destination, total, on_progress)?;

        Ok(resource.destination.clone())
    }

    fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

fn file_len(path: &Path) -> Result<u64> {
    path.metadata()
        .map(|m| m.len())
        .with_context(|| format!("reading metadata of {}", path.display()))
}
