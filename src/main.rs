//! Tank Arena Server - process entry point
//!
//! Loads configuration, installs logging, binds the listener and runs the
//! simulation until Ctrl+C or SIGTERM.

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use arena_server::app::ServerContext;
use arena_server::config::{Config, LogFormat};
use arena_server::game::{mode, Simulation};
use arena_server::net::serve;
use arena_server::util::time::{init_server_time, uptime_secs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level, config.log_format);
    init_server_time();

    info!("Starting Tank Arena Server");
    info!(
        mode = ?config.game_mode,
        tick_rate = config.tick_rate,
        max_players = config.max_players,
        "Configuration loaded"
    );

    // Failing to bind aborts startup
    let addr = config.server_addr;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let mode = mode::from_config(&config);
    let (ctx, commands) = ServerContext::new(config, mode);

    let simulation = tokio::spawn(Simulation::new(ctx.clone(), commands).run());
    let accept_loop = tokio::spawn(serve(listener, ctx.clone()));

    info!("Server listening on {}", addr);

    shutdown_signal().await;
    ctx.stop();

    if let Err(e) = simulation.await {
        error!(error = %e, "Simulation task failed");
    }
    if let Err(e) = accept_loop.await {
        error!(error = %e, "Accept loop failed");
    }

    info!(uptime_secs = uptime_secs(), "Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
