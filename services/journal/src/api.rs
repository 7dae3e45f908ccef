use crate::auth::{AccountStatus, AuthState, Authenticator, IdentityCredential};
use crate::config::ApiConfig;
use crate::error::{AuthError, DownloadError, SaveError, StoreError};
use crate::journal::JournalCoordinator;
use crate::media_uploader::MediaUploadOrchestrator;
use crate::metadata_store::MetadataStore;
use crate::models::{JournalEntry, NewProfile, ProfileUpdate, UserProfile};
use crate::object_store::VIDEO_CONTENT_TYPE;
use crate::pipeline::JournalPipeline;
use crate::profiles::ProfileService;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub uploader: Arc<MediaUploadOrchestrator>,
    pub pipeline: Arc<JournalPipeline>,
    pub coordinator: Arc<JournalCoordinator>,
    pub profiles: ProfileService,
    pub authenticator: Arc<Authenticator>,
    pub metadata_store: Arc<dyn MetadataStore>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(what) => api_error(StatusCode::NOT_FOUND, what, "NOT_FOUND"),
        StoreError::Conflict(what) => {
            warn!(conflict = %what, "Record already exists");
            api_error(StatusCode::CONFLICT, "Record already exists", "CONFLICT")
        }
        StoreError::Unavailable(reason) => {
            error!(error = %reason, "Metadata store unavailable");
            api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "Metadata store unavailable",
                "STORE_UNAVAILABLE",
            )
        }
    }
}

fn save_error(e: SaveError) -> ApiError {
    error!(error = %e, code = e.code(), "Failed to save recording");
    api_error(StatusCode::BAD_GATEWAY, e.to_string(), e.code())
}

fn download_error(e: DownloadError) -> ApiError {
    match e {
        DownloadError::ForeignLocation(_) => api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            e.to_string(),
            "FOREIGN_LOCATION",
        ),
        DownloadError::FetchFailed(_) => {
            error!(error = %e, "Video download failed");
            api_error(StatusCode::BAD_GATEWAY, e.to_string(), "FETCH_FAILED")
        }
    }
}

fn auth_error(e: AuthError) -> ApiError {
    match e {
        AuthError::NoAccount => api_error(StatusCode::FORBIDDEN, e.to_string(), "NO_ACCOUNT"),
        AuthError::Restricted => {
            api_error(StatusCode::FORBIDDEN, e.to_string(), "ACCOUNT_RESTRICTED")
        }
        AuthError::TemporarilyUnavailable => api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            e.to_string(),
            "ACCOUNT_TEMPORARILY_UNAVAILABLE",
        ),
        AuthError::CouldNotDetermine | AuthError::Unknown => {
            api_error(StatusCode::FORBIDDEN, e.to_string(), "ACCOUNT_STATUS_UNKNOWN")
        }
        AuthError::Session(reason) => {
            error!(error = %reason, "Session storage failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Session storage failed",
                "SESSION_ERROR",
            )
        }
        AuthError::Store(e) => store_error(e),
    }
}

/// Entry listing response
#[derive(Debug, Serialize)]
pub struct EntryListResponse {
    pub entries: Vec<JournalEntry>,
}

/// Days with no recording
#[derive(Debug, Serialize)]
pub struct MissingDatesResponse {
    pub dates: Vec<NaiveDate>,
}

/// Sign-in completion reported by the client
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    #[serde(flatten)]
    pub credential: IdentityCredential,
    #[serde(default)]
    pub account_status: AccountStatus,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(
            "/api/v1/users/:owner_id/entries",
            get(list_entries).post(create_entry),
        )
        .route("/api/v1/users/:owner_id/missing-dates", get(missing_dates))
        .route(
            "/api/v1/entries/:entry_id",
            get(get_entry).delete(delete_entry),
        )
        .route("/api/v1/entries/:entry_id/video", get(get_entry_video))
        .route("/api/v1/users", post(create_profile))
        .route(
            "/api/v1/users/:user_id",
            get(get_profile).patch(update_profile),
        )
        .route(
            "/api/v1/session",
            get(session_state).post(sign_in).delete(sign_out),
        )
        .route("/api/v1/session/failed", post(sign_in_failed))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "journal-service"
    }))
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.metadata_store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Save an uploaded mp4 recording as a new journal entry
#[instrument(skip(state, body), fields(size_bytes = body.len()))]
async fn create_entry(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<JournalEntry>), ApiError> {
    if body.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Request body must contain the recorded video",
            "EMPTY_BODY",
        ));
    }

    // Removed when `recording` drops, after the pipeline has finished with it
    let recording = tempfile::Builder::new()
        .prefix("journal-upload-")
        .suffix(".mp4")
        .tempfile()
        .map_err(|e| {
            error!(error = %e, "Failed to create temp file");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to stage upload",
                "STAGING_FAILED",
            )
        })?;

    tokio::fs::write(recording.path(), &body).await.map_err(|e| {
        error!(error = %e, "Failed to write temp file");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to stage upload",
            "STAGING_FAILED",
        )
    })?;
    drop(body);

    let entry = state
        .pipeline
        .save_recording(recording.path(), &owner_id)
        .await
        .map_err(save_error)?;

    Ok((StatusCode::CREATED, Json(entry)))
}

#[instrument(skip(state))]
async fn list_entries(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<Json<EntryListResponse>, ApiError> {
    let entries = state
        .coordinator
        .list_entries(&owner_id)
        .await
        .map_err(store_error)?
        .collect();

    Ok(Json(EntryListResponse { entries }))
}

#[instrument(skip(state))]
async fn missing_dates(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<Json<MissingDatesResponse>, ApiError> {
    let entries: Vec<JournalEntry> = state
        .coordinator
        .list_entries(&owner_id)
        .await
        .map_err(store_error)?
        .collect();

    let dates = state
        .coordinator
        .missing_dates_for(&owner_id, &entries)
        .await
        .map_err(store_error)?;

    Ok(Json(MissingDatesResponse { dates }))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<JournalEntry>, ApiError> {
    state
        .coordinator
        .fetch_entry(entry_id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("Entry {} not found", entry_id),
                "NOT_FOUND",
            )
        })
}

/// Return an entry's video bytes from the bucket
#[instrument(skip(state))]
async fn get_entry_video(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .coordinator
        .fetch_entry(entry_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("Entry {} not found", entry_id),
                "NOT_FOUND",
            )
        })?;

    let video = state
        .uploader
        .fetch_video(&entry.video_location)
        .await
        .map_err(download_error)?;

    Ok(([(header::CONTENT_TYPE, VIDEO_CONTENT_TYPE)], video))
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state
        .coordinator
        .delete_entry(entry_id)
        .await
        .map_err(store_error)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Entry {} not found", entry_id),
            "NOT_FOUND",
        ))
    }
}

async fn create_profile(
    State(state): State<AppState>,
    Json(profile): Json<NewProfile>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let created = state
        .profiles
        .create_profile(&profile)
        .await
        .map_err(store_error)?;

    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    state
        .profiles
        .fetch_profile(&user_id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("User {} not found", user_id),
                "NOT_FOUND",
            )
        })
}

async fn update_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>, ApiError> {
    let updated = state
        .profiles
        .update_settings(&user_id, update)
        .await
        .map_err(store_error)?;

    Ok(Json(updated))
}

async fn session_state(State(state): State<AppState>) -> Json<AuthState> {
    Json(state.authenticator.state().await)
}

async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<AuthState>, ApiError> {
    if let Err(e) = request.account_status.ensure_available() {
        warn!(status = ?request.account_status, "Sign-in rejected by account status");
        return Err(auth_error(e));
    }

    let next = state
        .authenticator
        .complete_sign_in(request.credential)
        .await
        .map_err(auth_error)?;

    Ok(Json(next))
}

async fn sign_in_failed(State(state): State<AppState>) -> Result<Json<AuthState>, ApiError> {
    let next = state
        .authenticator
        .sign_in_failed()
        .await
        .map_err(auth_error)?;
    Ok(Json(next))
}

async fn sign_out(State(state): State<AppState>) -> Result<Json<AuthState>, ApiError> {
    let next = state.authenticator.sign_out().await.map_err(auth_error)?;
    Ok(Json(next))
}

/// Start the API server; returns once `shutdown` is cancelled and in-flight requests finish
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting journal API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API server error")?;

    Ok(())
}
