use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use aptsync_utils::fs::{ensure_dir_exists, safe_remove};
use tracing::{debug, trace};

use crate::{
    cancel::CancellationToken,
    error::{DownloadError, ErrorContext, Result},
    http::HttpFetcher,
    local::LocalFetcher,
    types::{Progress, Resource},
    utils::url_scheme,
};

/// Retrieves resources into local files.
///
/// Implementations only provide [`Fetcher::fetch`]; the batch loop, cancellation
/// checks and error wrapping live in [`Fetcher::download_resources`].
pub trait Fetcher: Send + Sync {
    /// Fetches one resource to its destination and returns the local path.
    fn fetch(&self, resource: &Resource, on_progress: &dyn Fn(Progress)) -> Result<PathBuf>;

    fn cancel_token(&self) -> &CancellationToken;

    /// Fetches every resource in order, returning them with `path` filled in.
    ///
    /// Cancellation is checked before each resource. The first failure aborts
    /// the batch and is reported as [`DownloadError::Resource`].
    fn download_resources(
        &self,
        resources: Vec<Resource>,
        on_progress: &dyn Fn(&Resource, Progress),
    ) -> Result<Vec<Resource>> {
        let mut fetched = Vec::with_capacity(resources.len());

        for mut resource in resources {
            if self.cancel_token().is_cancelled() {
                debug!(resource = %resource.name, "fetch cancelled");
                return Err(DownloadError::Cancelled);
            }

            let result = self.fetch(&resource, &|progress| on_progress(&resource, progress));
            let path = result.map_err(|err| {
                DownloadError::Resource {
                    name: resource.name.clone(),
                    url: resource.url.clone(),
                    source: Box::new(err),
                }
            })?;

            trace!(resource = %resource.name, path = %path.display(), "fetched");
            resource.path = Some(path);
            fetched.push(resource);
        }

        Ok(fetched)
    }
}

/// Picks a fetcher for the repository URL's scheme.
///
/// # Errors
///
/// * [`DownloadError::UnsupportedScheme`] for anything other than http, https, file
///   or a bare absolute path.
pub fn fetcher_for_url(url: &str, cancel: CancellationToken) -> Result<Box<dyn Fetcher>> {
    let scheme = url_scheme(url).ok_or_else(|| {
        DownloadError::UnsupportedScheme {
            scheme: String::new(),
            url: url.to_string(),
        }
    })?;

    match scheme.as_str() {
        "http" | "https" => Ok(Box::new(HttpFetcher::new(cancel))),
        "file" => Ok(Box::new(LocalFetcher::new(cancel))),
        _ => {
            Err(DownloadError::UnsupportedScheme {
                scheme,
                url: url.to_string(),
            })
        }
    }
}

/// Streams `reader` into `destination`, reporting progress per chunk.
///
/// A partially written file is removed on failure.
pub(crate) fn write_stream<R: Read>(
    reader: &mut R,
    destination: &Path,
    total: u64,
    on_progress: &dyn Fn(Progress),
) -> Result<u64> {
    if let Some(parent) = destination.parent() {
        ensure_dir_exists(parent)?;
    }

    on_progress(Progress::Starting {
        total,
    });

    let result = copy_chunks(reader, destination, total, on_progress);
    if result.is_err() {
        let _ = safe_remove(destination);
    }
    let written = result?;

    on_progress(Progress::Complete {
        total: if total == 0 { written } else { total },
    });

    Ok(written)
}

fn copy_chunks<R: Read>(
    reader: &mut R,
    destination: &Path,
    total: u64,
    on_progress: &dyn Fn(Progress),
) -> Result<u64> {
    let mut file = File::create(destination)
        .with_context(|| format!("creating {}", destination.display()))?;

    let mut buffer = [0u8; 8192];
    let mut written = 0u64;

    loop {
        let n = reader
            .read(&mut buffer)
            .with_context(|| format!("reading data for {}", destination.display()))?;
        if n == 0 {
            break;
        }

        file.write_all(&buffer[..n])
            .with_context(|| format!("writing {}", destination.display()))?;
        written += n as u64;

        on_progress(Progress::Chunk {
            current: written,
            total,
        });
    }

    file.flush()
        .with_context(|| format!("flushing {}", destination.display()))?;

    Ok(written)
}
