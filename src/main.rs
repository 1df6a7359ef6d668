use std::net::SocketAddr;
use std::process::ExitCode;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use maintenance_gate::{
    AppState, Config, MaintenanceGate, build_admin_router, build_router, metrics, utils,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting Maintenance Gate v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        admin_host = %config.admin_host,
        admin_port = %config.admin_port,
        upstream = %config.upstream_url,
        "Configuration loaded"
    );

    // Build every allow-list, proxy set and credential table up front
    let gate = MaintenanceGate::provision(&config).map_err(|e| {
        error!("Failed to provision maintenance gate: {e}");
        exitcode::CONFIG
    })?;

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    let gated_addr = parse_addr(&config.server_addr())?;
    let admin_addr = parse_addr(&config.admin_addr())?;

    let state = AppState::new(gate, config).map_err(|e| {
        error!("Failed to build application state: {e}");
        exitcode::CONFIG
    })?;

    let gated_listener = bind(gated_addr).await?;
    let admin_listener = bind(admin_addr).await?;

    info!("Gated listener on http://{gated_addr} (forwarding to {})", state.upstream);
    info!("Admin API on http://{admin_addr}");
    info!("  GET  /health             - Health check");
    info!("  GET  /maintenance/status - Current maintenance state");
    info!("  POST /maintenance/set    - Switch maintenance mode");

    // Signal → release held requests → drain both listeners
    let shutdown = state.shutdown_token();
    let signal_state = state.clone();
    tokio::spawn(async move {
        utils::shutdown_signal().await;
        signal_state.shutdown();
    });

    let result = tokio::try_join!(
        serve(gated_listener, build_router(state.clone()), shutdown.clone()),
        serve(admin_listener, build_admin_router(state.clone()), shutdown),
    );

    // A failed listener must not leave the other one holding requests
    state.shutdown();

    result.map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("Server shutdown complete");
    Ok(())
}

fn parse_addr(addr: &str) -> Result<SocketAddr, exitcode::ExitCode> {
    addr.parse().map_err(|e| {
        error!("Invalid listen address {addr}: {e}");
        exitcode::CONFIG
    })
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, exitcode::ExitCode> {
    TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })
}

async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await
}
