use anyhow::Context;
use clap::Parser;
use flakeid_orchestrator::{
    allocator::LeaseTable,
    config::{CliArgs, OrchestratorConfig},
    service::{AppState, reap_expired, router},
    telemetry::init_telemetry,
};
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = OrchestratorConfig::try_from(args)?;

    init_telemetry();

    let state = AppState::new(LeaseTable::new(
        config.pool_max,
        config.lease_ttl,
        config.grace,
    ));
    let shutdown = CancellationToken::new();
    let reaper = tokio::spawn(reap_expired(
        state.clone(),
        config.lease_ttl / 2,
        shutdown.clone(),
    ));

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(
        "Starting orchestrator on {} (machine ids 0..={}, ttl {:?}, grace {:?})",
        config.listen_addr,
        config.pool_max,
        config.lease_ttl,
        config.grace
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    let _ = reaper.await;
    tracing::info!("Orchestrator shut down successfully");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
    shutdown.cancel();
}
