use std::path::PathBuf;

use tracing::debug;
use ureq::{
    http::{header::CONTENT_LENGTH, Response},
    Body,
};

use crate::{
    cancel::CancellationToken,
    error::{DownloadError, Result},
    fetcher::{write_stream, Fetcher},
    http_client::SHARED_AGENT,
    types::{Progress, Resource},
};

pub struct Http;

impl Http {
    pub fn fetch(url: &str) -> Result<Response<Body>> {
        SHARED_AGENT.get(url).call().map_err(|err| {
            match err {
                ureq::Error::StatusCode(status) => {
                    DownloadError::HttpError {
                        status,
                        url: url.to_string(),
                    }
                }
                other => DownloadError::from(other),
            }
        })
    }

    fn content_length(resp: &Response<Body>) -> u64 {
        resp.headers()
            .get(CONTENT_LENGTH)
            .and_then(|h| h.to_str().ok())
            .and_then(|len| len.parse::<u64>().ok())
            .unwrap_or(0)
    }
}

/// Fetches resources over HTTP/HTTPS with the shared agent.
pub struct HttpFetcher {
    cancel: CancellationToken,
}

impl HttpFetcher {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, resource: &Resource, on_progress: &dyn Fn(Progress)) -> Result<PathBuf> {
        debug!(url = %resource.url, "GET");
        let resp = Http::fetch(&resource.url)?;
        let total = Http::content_length(&resp);

        let mut reader = resp.into_body().into_reader();
        write_stream(&mut reader, &resource.destination, total, on_progress)?;

        Ok(resource.destination.clone())
    }

    fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
