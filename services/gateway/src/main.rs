mod config;
mod error;
mod handlers;
mod models;
mod router;
mod state;

use clap::Parser;
use config::GatewayConfig;
use depth_mirror::metrics::MirrorMetrics;
use depth_mirror::snapshot::RestSnapshotLoader;
use depth_mirror::stream::WsStreamConnector;
use depth_mirror::{MirrorHandle, QueryService, run_ingestion};
use router::create_router;
use state::AppState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let gateway_config = GatewayConfig::parse();
    let mirror_config = gateway_config.mirror_config()?;

    tracing::info!(
        symbol = %mirror_config.symbol,
        stream = %mirror_config.stream_url(),
        snapshot = %mirror_config.snapshot_url(),
        history_capacity = mirror_config.history_capacity,
        "Starting depth gateway"
    );

    let metrics = Arc::new(MirrorMetrics::new());
    let handle = Arc::new(MirrorHandle::new(
        mirror_config.symbol.clone(),
        mirror_config.history_capacity,
        Arc::clone(&metrics),
    ));

    let snapshots = RestSnapshotLoader::new(&mirror_config)?;
    let connector = WsStreamConnector::new(&mirror_config, metrics);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ingestion = tokio::spawn(run_ingestion(
        Arc::clone(&handle),
        snapshots,
        connector,
        mirror_config.reconnect_delay,
        shutdown_rx.clone(),
    ));

    let app = create_router(AppState::new(QueryService::new(handle)));
    let listener = TcpListener::bind(gateway_config.listen_addr).await?;
    tracing::info!("Listening on {}", gateway_config.listen_addr);

    let mut server_shutdown = shutdown_rx;
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping");
    let _ = shutdown_tx.send(true);

    let grace = gateway_config.shutdown_grace();
    let joined = tokio::time::timeout(grace, async {
        let ingestion_result = ingestion.await;
        let server_result = server.await;
        (ingestion_result, server_result)
    })
    .await;

    match joined {
        Ok((ingestion_result, server_result)) => {
            if let Err(e) = ingestion_result {
                tracing::warn!(error = %e, "Ingestion task ended abnormally");
            }
            match server_result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "HTTP server error"),
                Err(e) => tracing::warn!(error = %e, "HTTP server task ended abnormally"),
            }
        }
        Err(_) => tracing::warn!(
            grace_secs = grace.as_secs(),
            "Tasks did not finish within the shutdown grace period"
        ),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
