//! YouJournal Journal Service
//!
//! Backend for a daily video journal. A recorded clip is uploaded to S3
//! together with a JPEG thumbnail taken half a second in, and only once both
//! objects are stored is a journal entry recorded in PostgreSQL.
//!
//! ## Features
//!
//! - **Ordered Upload Pipeline**: video, then thumbnail extraction, then
//!   thumbnail upload; the first failure stops the pipeline and names the step
//! - **Deterministic Object Keys**: `{owner}_{seconds}.{millis}.mp4` with a
//!   sibling `_thumbnail.jpg`, addressed as public bucket URLs
//! - **Entry Feed**: entries with locally cached thumbnails, newest first,
//!   plus the calendar days that still have no recording
//! - **Profiles and Sessions**: user settings and a persisted sign-in session
//!
//! ## Architecture
//!
//! ```text
//!  HTTP API                     S3 Bucket                PostgreSQL
//! ┌──────────────┐            ┌──────────────┐         ┌──────────────┐
//! │ POST entries │            │ {owner}_{ts} │         │ entries      │
//! └──────────────┘            │   .mp4       │         │ users        │
//!        │                    │   _thumbnail │         └──────────────┘
//!        ▼                    │   .jpg       │                ▲
//! ┌──────────────┐            └──────────────┘                │
//! │ Journal      │                   ▲                        │
//! │ Pipeline     │                   │                        │
//! └──────────────┘                   │                        │
//!    │       │                       │                        │
//!    ▼       └───────────────┐       │                        │
//! ┌──────────────┐    ┌──────────────┐                 ┌──────────────┐
//! │ Media Upload │───▶│ ffmpeg       │                 │ Journal      │
//! │ Orchestrator │    │ Thumbnailer  │                 │ Coordinator  │
//! └──────────────┘    └──────────────┘                 └──────────────┘
//!                                                             │
//!                                                             ▼
//!                                                      ┌──────────────┐
//!                                                      │ Thumbnail    │
//!                                                      │ Cache        │
//!                                                      └──────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod journal;
pub mod media_uploader;
pub mod metadata_store;
pub mod models;
pub mod object_store;
pub mod pipeline;
pub mod profiles;
pub mod thumbnail;
pub mod thumbnail_cache;

pub use api::{create_router, start_api_server, AppState};
pub use auth::{AccountStatus, AuthState, Authenticator, FileSessionStore, IdentityCredential};
pub use config::Config;
pub use error::{AuthError, DownloadError, RecordError, SaveError, StoreError, UploadError};
pub use journal::{missing_dates, missing_dates_until, EntryFeed, JournalCoordinator};
pub use media_uploader::MediaUploadOrchestrator;
pub use metadata_store::{MetadataStore, PgMetadataStore};
pub use models::{JournalEntry, UploadResult, UserProfile};
pub use object_store::{ObjectLocator, ObjectStore, S3ObjectStore};
pub use pipeline::JournalPipeline;
pub use profiles::ProfileService;
pub use thumbnail::{FfmpegThumbnailer, ThumbnailGenerator};
pub use thumbnail_cache::{HttpThumbnailFetcher, ThumbnailFetcher};
