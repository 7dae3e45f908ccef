use crate::config::S3Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Remote object storage used for journal media
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    /// Fetch the bytes stored under `key`
    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;
}

/// Maps object keys to public URLs and back.
///
/// URLs take the virtual-hosted form `https://{bucket}.{storage_host}/{key}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocator {
    bucket: String,
    storage_host: String,
}

impl ObjectLocator {
    pub fn new(bucket: impl Into<String>, storage_host: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            storage_host: storage_host.into(),
        }
    }

    pub fn from_config(config: &S3Config) -> Self {
        Self::new(&config.bucket, &config.storage_host)
    }

    fn prefix(&self) -> String {
        format!("https://{}.{}/", self.bucket, self.storage_host)
    }

    /// Public URL of an object key
    pub fn url_for(&self, key: &str) -> String {
        format!("{}{}", self.prefix(), key)
    }

    /// Object key of a public URL, if the URL points into this bucket
    pub fn key_for<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(&self.prefix()).filter(|key| !key.is_empty())
    }
}

/// Derive the video key for a recording.
/// Format: {owner_id}_{unix_seconds}.{millis}.mp4
pub fn video_key(owner_id: &str, captured_at: DateTime<Utc>) -> String {
    format!(
        "{owner}_{secs}.{millis:03}.mp4",
        owner = sanitize_key_component(owner_id),
        secs = captured_at.timestamp(),
        millis = captured_at.timestamp_subsec_millis()
    )
}

/// Derive the thumbnail key from its video key.
/// Format: {video_key without .mp4}_thumbnail.jpg
pub fn thumbnail_key(video_key: &str) -> String {
    let stem = video_key.strip_suffix(".mp4").unwrap_or(video_key);
    format!("{stem}_thumbnail.jpg")
}

/// Sanitize a key component to prevent path traversal
fn sanitize_key_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    multipart_threshold_bytes: usize,
    part_size_bytes: usize,
}

impl S3ObjectStore {
    /// Create a new S3 object store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Ok(Self::with_client(
            client,
            &config.bucket,
            config.multipart_threshold_bytes,
            config.part_size_bytes,
        ))
    }

    /// Wrap an already configured client
    pub fn with_client(
        client: S3Client,
        bucket: impl Into<String>,
        multipart_threshold_bytes: usize,
        part_size_bytes: usize,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            multipart_threshold_bytes,
            part_size_bytes: part_size_bytes.max(1),
        }
    }

    /// Simple single-part upload for small objects
    async fn simple_upload(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("Failed to upload object to S3")?;

        Ok(())
    }

    /// Multipart upload for large objects
    async fn multipart_upload(&self, key: &str, body: &[u8], content_type: &str) -> Result<()> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .context("Failed to create multipart upload")?;

        let upload_id = create_response
            .upload_id()
            .context("No upload ID in response")?;

        // Abort on failure so S3 drops the stored parts
        if let Err(e) = self.upload_parts(key, upload_id, body).await {
            if let Err(abort_err) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .send()
                .await
            {
                warn!(
                    key = %key,
                    upload_id = %upload_id,
                    error = %abort_err,
                    "Failed to abort multipart upload"
                );
            }
            return Err(e);
        }

        Ok(())
    }

    /// Upload every part of `body` and complete the multipart upload
    async fn upload_parts(&self, key: &str, upload_id: &str, body: &[u8]) -> Result<()> {
        let mut completed_parts = Vec::new();

        for (index, chunk) in body.chunks(self.part_size_bytes).enumerate() {
            let part_number = index as i32 + 1;

            let upload_part_response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk.to_vec()))
                .send()
                .await
                .context("Failed to upload part")?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .build(),
            );
        }

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .context("Failed to complete multipart upload")?;

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, body), fields(size_bytes = body.len()))]
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let size_bytes = body.len();

        if size_bytes > self.multipart_threshold_bytes {
            self.multipart_upload(key, &body, content_type).await?;
        } else {
            self.simple_upload(key, body, content_type).await?;
        }

        debug!(key = %key, size_bytes, "Object uploaded");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("Failed to get object from S3")?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read object body")?;

        Ok(data.into_bytes().to_vec())
    }
}
