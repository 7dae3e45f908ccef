use anyhow::{Context, Result};
use journal_service::{
    start_api_server, AppState, Authenticator, Config, FfmpegThumbnailer, FileSessionStore,
    HttpThumbnailFetcher, JournalCoordinator, JournalPipeline, MediaUploadOrchestrator,
    MetadataStore, ObjectLocator, PgMetadataStore, ProfileService, S3ObjectStore,
};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        bucket = %config.s3.bucket,
        "Starting YouJournal journal service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let pg_store = PgMetadataStore::new(&config.database)
        .await
        .context("Failed to initialize metadata store")?;

    if config.database.run_migrations {
        pg_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let metadata_store: Arc<dyn MetadataStore> = Arc::new(pg_store);

    let object_store = Arc::new(
        S3ObjectStore::new(&config.s3)
            .await
            .context("Failed to initialize S3 object store")?,
    );

    let uploader = Arc::new(MediaUploadOrchestrator::new(
        object_store,
        Arc::new(FfmpegThumbnailer::new(&config.thumbnail)),
        ObjectLocator::from_config(&config.s3),
        config.thumbnail.frame_offset(),
        config.s3.download_dir.clone(),
    ));

    let coordinator = Arc::new(JournalCoordinator::new(
        metadata_store.clone(),
        Arc::new(HttpThumbnailFetcher::new(
            config.listing.thumbnail_cache_dir.clone(),
        )),
        config.listing.thumbnail_fetch_concurrency,
    ));

    let authenticator = Arc::new(Authenticator::new(
        Arc::new(FileSessionStore::new(config.session.path.clone())),
        metadata_store.clone(),
    ));

    // Restore failures are logged, not fatal
    match authenticator.restore().await {
        Ok(state) => info!(state = ?state, "Sign-in state restored"),
        Err(e) => warn!(error = %e, "Could not restore sign-in state"),
    }

    let api_state = AppState {
        uploader: uploader.clone(),
        pipeline: Arc::new(JournalPipeline::new(uploader, coordinator.clone())),
        coordinator,
        profiles: ProfileService::new(metadata_store.clone()),
        authenticator,
        metadata_store,
    };

    let shutdown = CancellationToken::new();

    // Spawn API server task
    let api_config = config.api.clone();
    let api_shutdown = shutdown.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config, api_shutdown).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Journal service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down journal service");

    shutdown.cancel();
    if let Err(e) = api_handle.await {
        error!(error = %e, "API server task failed");
    }

    info!("Journal service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
