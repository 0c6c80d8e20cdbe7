use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use sign_translate::app_state::AppState;
use sign_translate::config::AppConfig;
use sign_translate::routes;
use sign_translate::services::stages::ModelRegistry;

const SWEEP_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        stand_in_models = config.use_stand_in_models,
        fallback = ?config.model_fallback,
        "Initializing sign-translate server"
    );

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    tracing::info!(
        upload_dir = %config.upload_dir.display(),
        results_dir = %config.results_dir.display(),
        "Preparing working directories"
    );
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .expect("Failed to create upload directory");
    tokio::fs::create_dir_all(&config.results_dir)
        .await
        .expect("Failed to create results directory");

    // No inference runtime is linked into this binary; stages use stand-in
    // output unless a model is registered here.
    let bind_addr = config.bind_addr.clone();
    let retention = config.job_retention();
    let state = AppState::from_config(config, ModelRegistry::default())
        .expect("Failed to initialize pipeline stages");

    spawn_sweeper(Arc::clone(&state.jobs), retention);

    let app = routes::router(state).route(
        "/metrics",
        get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

/// Periodically drop finished jobs past their retention.
fn spawn_sweeper(jobs: Arc<sign_translate::services::job_store::JobStore>, retention: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let evicted = jobs.evict_finished(retention);
            if evicted > 0 {
                tracing::info!(evicted, remaining = jobs.len(), "Evicted finished jobs");
            }
        }
    });
}
