use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the journal service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Thumbnail extraction configuration
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,
    /// Entry listing configuration
    #[serde(default)]
    pub listing: ListingConfig,
    /// Persisted sign-in session configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3 bucket name for journal videos and thumbnails
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Public host appended to the bucket name when building object URLs
    #[serde(default = "default_storage_host")]
    pub storage_host: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Multipart upload threshold in bytes (5MB default)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,
    /// Part size for multipart uploads in bytes (5MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
    /// Directory downloaded videos are written to
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Thumbnail extraction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailConfig {
    /// Path or name of the ffmpeg binary
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Offset into the clip the still frame is taken from, in milliseconds
    #[serde(default = "default_frame_offset_ms")]
    pub frame_offset_ms: u64,
    /// JPEG quality between 0.0 and 1.0
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: f32,
}

/// Entry listing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    /// Maximum number of concurrent thumbnail fetches per listing
    #[serde(default = "default_thumbnail_fetch_concurrency")]
    pub thumbnail_fetch_concurrency: usize,
    /// Directory prefetched thumbnails are cached in
    #[serde(default = "default_thumbnail_cache_dir")]
    pub thumbnail_cache_dir: PathBuf,
}

/// Persisted sign-in session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// File the signed-in user identifier is persisted to
    #[serde(default = "default_session_path")]
    pub path: PathBuf,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted video body size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

// Default value functions
fn default_service_name() -> String {
    "journal-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "eu-west-2".to_string()
}

fn default_storage_host() -> String {
    "s3.eu-west-2.amazonaws.com".to_string()
}

fn default_multipart_threshold() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_part_size() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_download_dir() -> PathBuf {
    std::env::temp_dir().join("journal-downloads")
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_frame_offset_ms() -> u64 {
    500
}

fn default_jpeg_quality() -> f32 {
    0.8
}

fn default_thumbnail_fetch_concurrency() -> usize {
    8
}

fn default_thumbnail_cache_dir() -> PathBuf {
    std::env::temp_dir().join("journal-thumbnails")
}

fn default_session_path() -> PathBuf {
    PathBuf::from("/var/lib/journal/session.json")
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "journal-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .add_source(config::File::with_name("config/journal").required(false))
            .add_source(config::File::with_name("/etc/journal/journal").required(false))
            // JOURNAL__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("JOURNAL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl ThumbnailConfig {
    /// Offset of the thumbnail frame as Duration
    pub fn frame_offset(&self) -> Duration {
        Duration::from_millis(self.frame_offset_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            frame_offset_ms: default_frame_offset_ms(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            thumbnail_fetch_concurrency: default_thumbnail_fetch_concurrency(),
            thumbnail_cache_dir: default_thumbnail_cache_dir(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_frame_offset_ms(), 500);
        assert_eq!(default_jpeg_quality(), 0.8);
        assert_eq!(default_thumbnail_fetch_concurrency(), 8);
        assert_eq!(default_storage_host(), "s3.eu-west-2.amazonaws.com");
    }

    #[test]
    fn test_frame_offset_duration() {
        let config = ThumbnailConfig::default();
        assert_eq!(config.frame_offset(), Duration::from_millis(500));
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = config::Config::builder()
            .set_override("s3.bucket", "journal-entries")
            .unwrap()
            .set_override("database.url", "postgres://localhost/journal")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.s3.bucket, "journal-entries");
        assert_eq!(config.s3.region, "eu-west-2");
        assert_eq!(config.service.name, "journal-service");
        assert_eq!(config.listing.thumbnail_fetch_concurrency, 8);
        assert!(config.database.run_migrations);
        assert!(config.api.cors_enabled);
    }
}
