//! HTTP(S) loader.
//!
//! Fetches manifests and assets from a hosted app. `load` concatenates the
//! suffix onto the prefix verbatim (manifest URLs are handed over whole, with
//! an empty suffix), while `copy` resolves asset paths against the prefix the
//! way a browser resolves relative links.

use crate::error::{ErrorKind, Result};
use crate::util::ensure_parent_dir;
use exn::ResultExt;
use reqwest::{Client, Response, StatusCode, Url};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

/// Loads content over HTTP(S).
#[derive(Debug, Clone)]
pub struct RemoteLoader {
    prefix: String,
    base: Url,
    client: Client,
}
impl RemoteLoader {
    /// Create a loader for the given URL prefix using a default client.
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        Self::with_client(prefix, Client::new())
    }

    /// Create a loader that shares an existing [`Client`] (and its
    /// connection pool, timeouts and TLS configuration).
    pub fn with_client(prefix: impl Into<String>, client: Client) -> Result<Self> {
        let prefix = prefix.into();
        let base = Url::parse(&prefix).or_raise(|| ErrorKind::InvalidUrl(prefix.clone()))?;
        Ok(Self { prefix, base, client })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn get(&self, url: Url) -> Result<Response> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .or_raise(|| ErrorKind::Network(url.to_string()))?;
        if response.status() != StatusCode::OK {
            tracing::debug!(%url, status = response.status().as_u16(), "Remote load rejected");
            exn::bail!(ErrorKind::Http(response.status().as_u16()));
        }
        Ok(response)
    }

    /// Fetch `prefix + suffix` and return the response body.
    #[instrument(level = "debug", skip(self), fields(prefix = %self.prefix))]
    pub async fn load(&self, suffix: &str) -> Result<Vec<u8>> {
        let raw = format!("{}{}", self.prefix, suffix);
        let url = Url::parse(&raw).or_raise(|| ErrorKind::InvalidUrl(raw.clone()))?;
        let response = self.get(url).await?;
        let body = response.bytes().await.or_raise(|| ErrorKind::Network(raw))?;
        Ok(body.to_vec())
    }

    /// Download `suffix` (resolved against the prefix) into `destination`.
    ///
    /// The body is streamed chunk by chunk; the returned future resolves once
    /// the file has been fully written and flushed. If the transfer breaks
    /// off, the partial file is removed.
    #[instrument(level = "debug", skip(self), fields(prefix = %self.prefix))]
    pub async fn copy(&self, suffix: &str, destination: &Path) -> Result<()> {
        let url = self.base.join(suffix).or_raise(|| ErrorKind::InvalidUrl(suffix.to_string()))?;
        let response = self.get(url.clone()).await?;
        ensure_parent_dir(destination).await?;
        let file = fs::File::create(destination).await.map_err(ErrorKind::Io)?;
        let written = Self::stream_into(response, file, &url).await;
        if written.is_err()
            && let Err(e) = fs::remove_file(destination).await
        {
            tracing::warn!(destination = %destination.display(), error = %e, "Could not remove partial download");
        }
        written
    }

    async fn stream_into(mut response: Response, mut file: fs::File, url: &Url) -> Result<()> {
        while let Some(chunk) = response.chunk().await.or_raise(|| ErrorKind::Network(url.to_string()))? {
            file.write_all(&chunk).await.map_err(ErrorKind::Io)?;
        }
        file.flush().await.map_err(ErrorKind::Io)?;
        Ok(())
    }
}
