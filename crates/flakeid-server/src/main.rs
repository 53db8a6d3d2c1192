#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use clap::Parser;
use flakeid::{
    Enrollment, IdentityOrigin, IdentitySource, InstanceName, ResolvedIdentity,
    SnowflakeGenerator, SystemClock, TimeSource, resolve_machine_id,
};
use server::config::{CORE_KEYS, CliArgs, ServerConfig};
use server::lease::keep_lease;
use server::orchestrator::{HttpOrchestrator, RetryPolicy};
use server::service::handler::{AppState, router};
use server::telemetry::init_telemetry;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    init_telemetry(args.docker);
    if let Some(path) = args.config_file(&args.base_dir()) {
        tracing::info!("Reading config file {}", path.display());
    }
    let layers = args.layers()?;
    let config = ServerConfig::from_layers(&args, &layers)?;

    for key in CORE_KEYS {
        let resolved = layers.resolve(key);
        tracing::debug!("{} = {:?} (from {})", key.name, resolved.value, resolved.source);
    }

    let layout = config
        .layout
        .validate(SystemClock.current_millis())
        .context("invalid id layout")?;

    let orchestrator = match &config.orchestrator_url {
        Some(url) => Some(HttpOrchestrator::new(
            url.clone(),
            config.orchestrator_timeout,
            RetryPolicy::new(config.orchestrator_attempts),
        )?),
        None => None,
    };

    let identity = match &orchestrator {
        Some(orchestrator) => {
            tracing::info!("Resolving machine id via orchestrator at {}", orchestrator.base_url());
            let source = IdentitySource {
                enrollment: Some(Enrollment {
                    orchestrator,
                    instance: InstanceName::for_current_process(&config.instance_host),
                }),
                static_machine_id: config.static_machine_id,
            };
            resolve_machine_id(&layout, source).await
        }
        None => resolve_machine_id(&layout, IdentitySource::static_only(config.static_machine_id)).await,
    }
    .context("failed to resolve machine id")?;
    let ResolvedIdentity { machine_id, origin } = identity;

    let generator = Arc::new(SnowflakeGenerator::with_policy(
        layout,
        machine_id,
        SystemClock,
        config.clock_policy,
    ));
    let shutdown = CancellationToken::new();

    let keeper = match (orchestrator, origin) {
        (Some(orchestrator), IdentityOrigin::Leased { registration, lease }) => {
            let token = shutdown.clone();
            Some(tokio::spawn(async move {
                keep_lease(&orchestrator, &registration, machine_id, lease, token).await
            }))
        }
        _ => None,
    };

    let listener = TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr))?;
    log_startup_info(&config, &generator);

    let app = router(AppState::new(
        Arc::clone(&generator),
        config.id_format,
        shutdown.clone(),
    ));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Stops the keeper if the server exited for another reason.
    shutdown.cancel();
    if let Some(keeper) = keeper {
        match keeper.await {
            Ok(exit) => tracing::info!("Lease keeper finished: {exit:?}"),
            Err(err) => tracing::error!("Lease keeper task failed: {err}"),
        }
    }

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(config: &ServerConfig, generator: &SnowflakeGenerator) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting ID service on {} with full config: {:#?}",
            config.server_addr,
            config
        );
    } else {
        tracing::info!(
            "Starting ID service on {} as machine {}",
            config.server_addr,
            generator.machine_id()
        );
    }
    let layout = generator.config();
    tracing::info!(
        machine_id = generator.machine_id().get(),
        machine_id_bits = layout.machine_id_bits(),
        sequence_bits = layout.sequence_bits(),
        epoch_millis = layout.epoch_millis(),
        last_representable_millis = layout.last_representable_millis(),
        "id layout"
    );
}

/// Resolves on Ctrl+C, SIGTERM, or when `shutdown` is cancelled elsewhere
/// (lease lost).
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
        () = shutdown.cancelled() => tracing::warn!("Shutdown requested by the lease keeper"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
    shutdown.cancel();
}
