use std::process::ExitCode;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ci_watchtower::config::Config;
use ci_watchtower::jobs::JobReconciler;
use ci_watchtower::server::{AppState, build_router};
use ci_watchtower::store::Store;
use ci_watchtower::sync::{HttpStatusSource, MergeSyncer};

/// Time in-flight HTTP requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

const WATCH_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ci_watchtower=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    if config.webhook_secret.is_empty() {
        tracing::warn!("No webhook secret configured, accepting unsigned requests");
    }

    let store = Store::open(config.store.clone())?;
    store.start_gc();

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    let (jobs_tx, jobs_rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
    tasks.push(tokio::spawn(
        JobReconciler::new(store.clone()).run(jobs_rx, shutdown.clone()),
    ));

    match &config.merge_status_url {
        Some(url) => {
            let syncer = MergeSyncer::new(HttpStatusSource::new(url.as_str())?, store.clone());
            tasks.push(tokio::spawn(syncer.run(config.sync_interval, shutdown.clone())));
        }
        None => tracing::info!("No merge status URL configured, merge status sync disabled"),
    }

    let app = build_router(AppState::new(
        store.clone(),
        config.webhook_secret.clone(),
        jobs_tx,
    ));

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("listening on {}", config.listen_addr);

    let serve_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
            .await
    });

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");
    shutdown.cancel();

    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "HTTP server failed"),
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server task panicked"),
        Err(_) => tracing::warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "In-flight requests did not finish within the grace period"
        ),
    }

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Background task panicked");
        }
    }

    store.close().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
