//! Error taxonomy for the journal pipeline.
//!
//! Adapters (S3, PostgreSQL, ffmpeg, HTTP) report `anyhow` errors with
//! context; the orchestrator and coordinator translate them into these types
//! at their boundary so callers can tell which pipeline step failed.

use thiserror::Error;

/// Errors from the media upload orchestrator.
///
/// Every variant after `VideoUploadFailed` leaves the already-uploaded video
/// in the bucket without a metadata record referencing it.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Video upload failed: {0}")]
    VideoUploadFailed(String),

    #[error("Thumbnail generation failed: {0}")]
    ThumbnailGenerationFailed(String),

    #[error("Thumbnail upload failed: {0}")]
    ThumbnailUploadFailed(String),
}

/// Errors from recording a journal entry.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Failed to persist journal entry: {0}")]
    PersistFailed(String),

    #[error("Upload result is missing the {0} location")]
    IncompleteUpload(&'static str),
}

/// Errors from the metadata store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Metadata store unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound(e.to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Errors from downloading a previously uploaded video.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Location is not in the journal bucket: {0}")]
    ForeignLocation(String),

    #[error("Failed to fetch video: {0}")]
    FetchFailed(String),
}

/// Account and session errors surfaced by the sign-in flow.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No account is signed in on this device")]
    NoAccount,

    #[error("Account access is restricted")]
    Restricted,

    #[error("Account service temporarily unavailable, try again later")]
    TemporarilyUnavailable,

    #[error("Could not determine account status")]
    CouldNotDetermine,

    #[error("Unknown account status")]
    Unknown,

    #[error("Session storage error: {0}")]
    Session(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the combined upload-then-record flow.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

impl SaveError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            SaveError::Upload(UploadError::VideoUploadFailed(_)) => "VIDEO_UPLOAD_FAILED",
            SaveError::Upload(UploadError::ThumbnailGenerationFailed(_)) => {
                "THUMBNAIL_GENERATION_FAILED"
            }
            SaveError::Upload(UploadError::ThumbnailUploadFailed(_)) => "THUMBNAIL_UPLOAD_FAILED",
            SaveError::Record(RecordError::PersistFailed(_)) => "PERSIST_FAILED",
            SaveError::Record(RecordError::IncompleteUpload(_)) => "INCOMPLETE_UPLOAD",
        }
    }
}
