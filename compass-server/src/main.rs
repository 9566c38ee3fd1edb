//! compass-server - performance management backend
//!
//! Tracks employees, career ladders, committee decisions, compensation and
//! seniority snapshots, one-on-ones, peer feedback, assessment forms and a
//! per-user career timeline behind a JSON HTTP API.

use anyhow::{Context, Result};
use clap::Parser;
use compass_common::config::{self, ServerConfig};
use compass_common::db::init_database;
use compass_server::{build_router, AppState};
use tokio::signal;
use tracing::info;

/// Command-line arguments for compass-server
#[derive(Parser, Debug)]
#[command(name = "compass-server")]
#[command(about = "Performance management backend")]
#[command(version)]
struct Args {
    /// Data directory holding the database (overrides COMPASS_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately after tracing init, before any
    // database delay
    info!(
        "Starting compass-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let data_dir = config::resolve_data_dir(args.data_dir.as_deref());
    let db_path = config::database_path(&data_dir);
    info!("Database path: {}", db_path.display());

    let server_config = ServerConfig::resolve().context("Failed to resolve configuration")?;
    info!(
        "Timeline access gate: {}",
        server_config.timeline_access.as_str()
    );

    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let state = AppState::new(pool, server_config.clone());
    let app = build_router(state);

    let addr = format!("{}:{}", server_config.host, server_config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("compass-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
