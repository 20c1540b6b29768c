//! Axum API server binary. Runs the job executor in the same process.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use tracing::{info, warn};

use mstudio_api::{create_router, metrics, ApiConfig, AppState};
use mstudio_media::StyleRegistry;
use mstudio_worker::{
    init_tracing, job_system, open_job_store, spawn_sweeper, Collaborators, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    init_tracing();
    info!("Starting mstudio-api");

    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    let worker_config = WorkerConfig::from_env();
    worker_config.validate()?;
    tokio::fs::create_dir_all(worker_config.videos_dir())
        .await
        .with_context(|| format!("cannot create {}", worker_config.videos_dir().display()))?;

    let store = open_job_store(&worker_config).await?;
    let collaborators = Collaborators::from_env(&worker_config)
        .await
        .context("failed to configure service clients")?;
    let styles = Arc::new(StyleRegistry::with_builtin_styles());

    let retention = worker_config.retention_window();
    let sweep_interval = worker_config.sweep_interval;
    let videos_dir = worker_config.videos_dir().to_path_buf();

    let (orchestrator, executor) =
        job_system(worker_config, store.clone(), styles.clone(), collaborators);
    let shutdown = executor.shutdown_handle();
    let executor_task = tokio::spawn(executor.run());
    let sweeper_task = spawn_sweeper(store, retention, sweep_interval, shutdown.subscribe());

    let metrics_handle = if config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Metrics disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let state = AppState::new(config.clone(), orchestrator, styles, videos_dir);
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown.shutdown();
    executor_task.await.ok();
    sweeper_task.await.ok();

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
