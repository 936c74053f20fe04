//! Fetching and storing blacklist sources.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::error::SourceFetchError;

/// Retrieves list bodies and their published hashes.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch the body at `url`.
    async fn fetch_text(&self, url: &str) -> Result<String, SourceFetchError>;

    /// Fetch the digest published at `url`, lowercased.
    ///
    /// Digest files often look like `<hex>  <file name>`; only the first token
    /// is kept.
    async fn fetch_hash(&self, url: &str) -> Result<String, SourceFetchError> {
        let text = self.fetch_text(url).await?;
        Ok(parse_hash(&text))
    }
}

/// [`SourceFetcher`] over HTTP(S), falling back to the filesystem for URLs
/// without an `http://` or `https://` scheme.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, SourceFetchError> {
        if let Some(path) = local_path(url) {
            debug!(path = %path.display(), "Reading local list");
            return Ok(fs::read_to_string(path).await?);
        }

        debug!(url, "Fetching list");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceFetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

/// Filesystem path for a source URL, if it is not an HTTP(S) URL.
pub fn local_path(url: &str) -> Option<&Path> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return None;
    }
    Some(Path::new(url.strip_prefix("file://").unwrap_or(url)))
}

fn parse_hash(text: &str) -> String {
    text.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// A previously downloaded list body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredList {
    pub body: String,
    /// md5 of the stored bytes, lowercase hex.
    pub hash: String,
}

/// Directory of downloaded list bodies, one file per source URL.
#[derive(Debug, Clone)]
pub struct SourceStore {
    dir: PathBuf,
}

impl SourceStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// File holding the body of `url`.
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("nullroute-{:x}.list", md5::compute(url)))
    }

    /// Read the stored copy of `url`, if there is one.
    pub async fn read(&self, url: &str) -> Option<StoredList> {
        let bytes = fs::read(self.path_for(url)).await.ok()?;
        let hash = format!("{:x}", md5::compute(&bytes));
        Some(StoredList {
            body: String::from_utf8_lossy(&bytes).into_owned(),
            hash,
        })
    }

    /// Replace the stored copy of `url`.
    pub async fn write(&self, url: &str, body: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.path_for(url), body).await
    }
}
