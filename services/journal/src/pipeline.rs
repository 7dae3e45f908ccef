use crate::error::SaveError;
use crate::journal::JournalCoordinator;
use crate::media_uploader::MediaUploadOrchestrator;
use crate::models::JournalEntry;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Upload a recording, then record it. No record is written unless the upload completed.
pub struct JournalPipeline {
    uploader: Arc<MediaUploadOrchestrator>,
    coordinator: Arc<JournalCoordinator>,
}

impl JournalPipeline {
    pub fn new(uploader: Arc<MediaUploadOrchestrator>, coordinator: Arc<JournalCoordinator>) -> Self {
        Self {
            uploader,
            coordinator,
        }
    }

    #[instrument(skip(self), fields(video = %local_video_path.display()))]
    pub async fn save_recording(
        &self,
        local_video_path: &Path,
        owner_id: &str,
    ) -> Result<JournalEntry, SaveError> {
        let upload = self.uploader.upload(local_video_path, owner_id).await?;
        let entry = self.coordinator.record_entry(owner_id, &upload).await?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::metadata_store::MockMetadataStore;
    use crate::object_store::{MockObjectStore, ObjectLocator};
    use crate::thumbnail::MockThumbnailGenerator;
    use crate::thumbnail_cache::MockThumbnailFetcher;
    use anyhow::anyhow;
    use std::io::Write;
    use std::time::Duration;
    use uuid::Uuid;

    fn pipeline(
        objects: MockObjectStore,
        thumbnailer: MockThumbnailGenerator,
        metadata: MockMetadataStore,
    ) -> JournalPipeline {
        let uploader = MediaUploadOrchestrator::new(
            Arc::new(objects),
            Arc::new(thumbnailer),
            ObjectLocator::new("journal-videos", "s3.eu-west-2.amazonaws.com"),
            Duration::from_millis(500),
            std::env::temp_dir(),
        );
        let coordinator =
            JournalCoordinator::new(Arc::new(metadata), Arc::new(MockThumbnailFetcher::new()), 1);
        JournalPipeline::new(Arc::new(uploader), Arc::new(coordinator))
    }

    fn recording() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        file.write_all(b"\x00\x00\x00\x18ftypmp42").unwrap();
        file
    }

    #[tokio::test]
    async fn test_save_recording_records_uploaded_entry() {
        let mut objects = MockObjectStore::new();
        objects.expect_put_object().times(2).returning(|_, _, _| Ok(()));

        let mut thumbnailer = MockThumbnailGenerator::new();
        thumbnailer
            .expect_generate()
            .returning(|_, _| Ok(vec![0xFF, 0xD8]));

        let mut metadata = MockMetadataStore::new();
        metadata.expect_create_entry().times(1).returning(|e| {
            Ok(JournalEntry {
                id: Uuid::new_v4(),
                owner_id: e.owner_id.clone(),
                captured_at: e.captured_at,
                video_location: e.video_location.clone(),
                thumbnail_location: e.thumbnail_location.clone(),
                cached_thumbnail: None,
            })
        });

        let file = recording();
        let entry = pipeline(objects, thumbnailer, metadata)
            .save_recording(file.path(), "user-42")
            .await
            .unwrap();

        assert!(entry
            .video_location
            .starts_with("https://journal-videos.s3.eu-west-2.amazonaws.com/user-42_"));
        assert!(entry.thumbnail_location.ends_with("_thumbnail.jpg"));
    }

    #[tokio::test]
    async fn test_video_upload_failure_stops_before_thumbnail() {
        let mut objects = MockObjectStore::new();
        objects
            .expect_put_object()
            .times(1)
            .returning(|_, _, _| Err(anyhow!("bucket unreachable")));

        let mut thumbnailer = MockThumbnailGenerator::new();
        thumbnailer.expect_generate().never();

        let mut metadata = MockMetadataStore::new();
        metadata.expect_create_entry().never();

        let file = recording();
        let err = pipeline(objects, thumbnailer, metadata)
            .save_recording(file.path(), "user-42")
            .await
            .unwrap_err();

        assert_eq!(err.code(), "VIDEO_UPLOAD_FAILED");
    }

    #[tokio::test]
    async fn test_thumbnail_failure_writes_no_record() {
        let mut objects = MockObjectStore::new();
        objects.expect_put_object().times(1).returning(|_, _, _| Ok(()));

        let mut thumbnailer = MockThumbnailGenerator::new();
        thumbnailer
            .expect_generate()
            .returning(|_, _| Err(anyhow!("no frame at 0.500s")));

        let mut metadata = MockMetadataStore::new();
        metadata.expect_create_entry().never();

        let file = recording();
        let err = pipeline(objects, thumbnailer, metadata)
            .save_recording(file.path(), "user-42")
            .await
            .unwrap_err();

        assert_eq!(err.code(), "THUMBNAIL_GENERATION_FAILED");
    }

    #[tokio::test]
    async fn test_record_failure_after_upload() {
        let mut objects = MockObjectStore::new();
        objects.expect_put_object().times(2).returning(|_, _, _| Ok(()));

        let mut thumbnailer = MockThumbnailGenerator::new();
        thumbnailer.expect_generate().returning(|_, _| Ok(vec![0xFF]));

        let mut metadata = MockMetadataStore::new();
        metadata
            .expect_create_entry()
            .returning(|_| Err(StoreError::Unavailable("pool timed out".to_string())));

        let file = recording();
        let err = pipeline(objects, thumbnailer, metadata)
            .save_recording(file.path(), "user-42")
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PERSIST_FAILED");
    }
}
