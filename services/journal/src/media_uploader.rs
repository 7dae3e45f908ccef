use crate::error::{DownloadError, UploadError};
use crate::models::UploadResult;
use crate::object_store::{
    thumbnail_key, video_key, ObjectLocator, ObjectStore, THUMBNAIL_CONTENT_TYPE,
    VIDEO_CONTENT_TYPE,
};
use crate::thumbnail::ThumbnailGenerator;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Uploads a recorded video and its thumbnail to object storage.
///
/// Steps run strictly in order: video upload, frame extraction, thumbnail
/// upload. A failed step stops the pipeline; objects written by earlier steps
/// are left in place.
pub struct MediaUploadOrchestrator {
    store: Arc<dyn ObjectStore>,
    thumbnailer: Arc<dyn ThumbnailGenerator>,
    locator: ObjectLocator,
    frame_offset: Duration,
    download_dir: PathBuf,
}

impl MediaUploadOrchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        thumbnailer: Arc<dyn ThumbnailGenerator>,
        locator: ObjectLocator,
        frame_offset: Duration,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            thumbnailer,
            locator,
            frame_offset,
            download_dir,
        }
    }

    /// Upload a local recording and return public URLs for it and its thumbnail
    #[instrument(skip(self), fields(video = %local_video_path.display()))]
    pub async fn upload(
        &self,
        local_video_path: &Path,
        owner_id: &str,
    ) -> Result<UploadResult, UploadError> {
        let started = Instant::now();
        let result = self.run_upload(local_video_path, owner_id).await;

        match &result {
            Ok(_) => {
                metrics::counter!("journal.uploads.completed").increment(1);
                metrics::histogram!("journal.upload.duration_seconds")
                    .record(started.elapsed().as_secs_f64());
            }
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "Upload pipeline failed");
                metrics::counter!("journal.uploads.failed").increment(1);
            }
        }

        result
    }

    async fn run_upload(
        &self,
        local_video_path: &Path,
        owner_id: &str,
    ) -> Result<UploadResult, UploadError> {
        let captured_at = Utc::now();
        let video_key = video_key(owner_id, captured_at);

        let video = tokio::fs::read(local_video_path).await.map_err(|e| {
            UploadError::VideoUploadFailed(format!(
                "failed to read {}: {}",
                local_video_path.display(),
                e
            ))
        })?;
        let video_size = video.len();

        self.store
            .put_object(&video_key, video, VIDEO_CONTENT_TYPE)
            .await
            .map_err(|e| UploadError::VideoUploadFailed(format!("{:#}", e)))?;

        debug!(key = %video_key, size_bytes = video_size, "Video uploaded");

        let thumbnail = self
            .thumbnailer
            .generate(local_video_path, self.frame_offset)
            .await
            .map_err(|e| UploadError::ThumbnailGenerationFailed(format!("{:#}", e)))?;

        let thumbnail_key = thumbnail_key(&video_key);

        self.store
            .put_object(&thumbnail_key, thumbnail, THUMBNAIL_CONTENT_TYPE)
            .await
            .map_err(|e| UploadError::ThumbnailUploadFailed(format!("{:#}", e)))?;

        info!(
            video_key = %video_key,
            thumbnail_key = %thumbnail_key,
            size_bytes = video_size,
            "Recording uploaded"
        );

        Ok(UploadResult {
            video_location: self.locator.url_for(&video_key),
            thumbnail_location: self.locator.url_for(&thumbnail_key),
            captured_at,
        })
    }

    /// Fetch the bytes of a previously uploaded video
    #[instrument(skip(self))]
    pub async fn fetch_video(&self, remote_video_location: &str) -> Result<Vec<u8>, DownloadError> {
        let key = self.own_key(remote_video_location)?;

        self.store
            .get_object(key)
            .await
            .map_err(|e| DownloadError::FetchFailed(format!("{:#}", e)))
    }

    /// Fetch a previously uploaded video into the local download directory.
    ///
    /// The file is written under a temporary name and renamed into place, so
    /// concurrent readers see either a complete previous copy or the new one.
    #[instrument(skip(self))]
    pub async fn download(&self, remote_video_location: &str) -> Result<PathBuf, DownloadError> {
        let key = self.own_key(remote_video_location)?;
        let file_name = key
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
            .ok_or_else(|| DownloadError::ForeignLocation(remote_video_location.to_string()))?;
        let destination = self.download_dir.join(file_name);

        let bytes = self
            .store
            .get_object(key)
            .await
            .map_err(|e| DownloadError::FetchFailed(format!("{:#}", e)))?;

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| DownloadError::FetchFailed(e.to_string()))?;

        let partial = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(&self.download_dir)
            .map_err(|e| DownloadError::FetchFailed(e.to_string()))?;
        tokio::fs::write(partial.path(), &bytes)
            .await
            .map_err(|e| DownloadError::FetchFailed(e.to_string()))?;
        partial
            .persist(&destination)
            .map_err(|e| DownloadError::FetchFailed(e.error.to_string()))?;

        debug!(
            key = %key,
            path = %destination.display(),
            size_bytes = bytes.len(),
            "Video downloaded"
        );

        Ok(destination)
    }

    fn own_key<'a>(&self, remote_video_location: &'a str) -> Result<&'a str, DownloadError> {
        self.locator
            .key_for(remote_video_location)
            .ok_or_else(|| DownloadError::ForeignLocation(remote_video_location.to_string()))
    }
}
