use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::HttpConfig;
use crate::error::{FetchError, LoudcastError, Result};

/// Retrieval of the feed document and episode audio
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Full body of the feed document
    async fn fetch_feed(&self, url: &str) -> Result<Vec<u8>>;

    /// Download `url` to `dest`, returning the number of bytes written.
    /// `dest` either holds the complete body afterwards or is untouched.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// HTTP fetcher; single attempt per request, non-2xx is a failure
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| LoudcastError::generic(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let parsed = reqwest::Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }
        Ok(response)
    }
}

fn request_error(url: &str, e: reqwest::Error) -> LoudcastError {
    FetchError::Request {
        url: url.to_string(),
        reason: e.to_string(),
    }
    .into()
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> LoudcastError {
    FetchError::Write {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
    .into()
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<u8>> {
        // Local documents are accepted for offline runs
        if let Some(path) = url.strip_prefix("file://") {
            debug!("Reading feed from {}", path);
            return Ok(tokio::fs::read(path).await?);
        }

        info!("Fetching feed {}", url);
        let body = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|e| request_error(url, e))?;
        Ok(body.to_vec())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self.get(url).await?;

        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| write_error(&dir, e))?;

        let partial = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(&dir)
            .map_err(|e| write_error(dest, e))?;
        let (file, partial_path) = partial.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(|e| request_error(url, e))? {
            file.write_all(&chunk)
                .await
                .map_err(|e| write_error(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| write_error(dest, e))?;
        drop(file);

        partial_path
            .persist(dest)
            .map_err(|e| write_error(dest, e.error))?;

        debug!("Downloaded {} ({} bytes) to {:?}", url, written, dest);
        Ok(written)
    }
}
