use anyhow::Result;
use axum::Router;
use deepresearch_api::{routes::build_router, state::AppState};
use deepresearch_core::{
    ConfigLoader, TelemetryOptions, init_telemetry, metrics::init_metrics_from_env,
};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::load(None)?;
    init_telemetry(TelemetryOptions::from_logging(&config.logging))?;
    init_metrics_from_env("deepresearch-api")?;

    let state = AppState::try_new(&config)?;
    info!(
        reasoning_model = %config.llm.reasoning_model,
        fast_model = %config.llm.fast_model,
        search_mock_mode = config.search_mock_mode(),
        max_concurrent_runs = config.server.max_concurrent_runs,
        "research workflow ready"
    );

    let app: Router = build_router(state);
    let listener = TcpListener::bind(&config.server.listen_addr).await?;
    info!(address = %config.server.listen_addr, "deepresearch-api listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| {
            error!(error = %err, "server shutdown with error");
            err
        })?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            stream.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
