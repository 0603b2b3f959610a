//! Datalogger Service - control panel backend.
//!
//! Run with: `cargo run -p datalogger-service -- --mock`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use datalogger_core::{MockLogger, SerialLogger, SharedLogger};
use datalogger_service::{AppState, Config, DriverKind};

/// Datalogger Service - serial data logger control panel backend.
#[derive(Parser, Debug)]
#[command(name = "datalogger-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Use the simulated driver instead of a serial port.
    #[arg(long)]
    mock: bool,

    /// Status poll interval in seconds (overrides config).
    #[arg(short, long)]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("datalogger_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Override config with CLI args
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(interval) = args.interval {
        config.broadcaster.interval_secs = interval;
    }
    if args.mock {
        config.hardware.driver = DriverKind::Mock;
    }
    config.validate()?;

    let logger: SharedLogger = match config.hardware.driver {
        DriverKind::Serial => {
            info!(
                "Using serial driver, downloads go to {}",
                config.hardware.download_dir.display()
            );
            Arc::new(SerialLogger::new(config.hardware.serial_options()))
        }
        DriverKind::Mock => {
            info!("Using simulated driver");
            Arc::new(MockLogger::new())
        }
    };

    let addr: SocketAddr = config.server.bind.parse()?;

    // Create application state. The broadcaster starts with the first subscriber.
    let state = AppState::new(logger, config);
    let app = datalogger_service::app(Arc::clone(&state));

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown = state.shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
            _ = shutdown.cancelled() => {}
        }
        shutdown.cancel();
    })
    .await?;

    // Make sure the broadcaster has observed the shutdown.
    state.shutdown.cancel();
    if let Some(handle) = state.broadcaster.handle() {
        handle.join().await;
    }

    info!("Server stopped");
    Ok(())
}
