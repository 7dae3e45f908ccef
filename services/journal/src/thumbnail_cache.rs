use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Fetches remote thumbnails into local storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThumbnailFetcher: Send + Sync {
    /// Download `url` and return the local path of the cached copy
    async fn fetch(&self, url: &str) -> Result<PathBuf>;
}

/// HTTP thumbnail fetcher backed by a cache directory
pub struct HttpThumbnailFetcher {
    client: reqwest::Client,
    cache_dir: PathBuf,
}

impl HttpThumbnailFetcher {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache_dir,
        }
    }

    fn cache_path(&self, url: &str) -> Result<PathBuf> {
        let name = url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
            .ok_or_else(|| anyhow!("Thumbnail URL has no file name: {}", url))?;

        Ok(self.cache_dir.join(name))
    }
}

#[async_trait]
impl ThumbnailFetcher for HttpThumbnailFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<PathBuf> {
        let path = self.cache_path(url)?;

        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .context("Thumbnail request failed")?
            .error_for_status()
            .context("Thumbnail request rejected")?
            .bytes()
            .await
            .context("Failed to read thumbnail body")?;

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .context("Failed to create thumbnail cache directory")?;
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        debug!(path = %path.display(), size_bytes = bytes.len(), "Thumbnail cached");
        Ok(path)
    }
}
