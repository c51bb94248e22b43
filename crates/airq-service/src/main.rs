//! airq - particulate sensor ingestion and query service.
//!
//! Run with: `cargo run -p airq-service -- all`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use airq_core::{SerialDevice, SystemClock};
use airq_service::{AppState, Config};
use airq_store::SampleStore;

/// airq - particulate sensor ingestion and query service.
#[derive(Parser, Debug)]
#[command(name = "airq")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Port to listen on (overrides the port of the bind address).
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Serial port of the sensor (overrides config).
    #[arg(long, global = true)]
    device: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Read the sensor and store readings.
    Sensor,
    /// Serve the query API.
    Web,
    /// Read the sensor and serve the query API (default).
    All,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("airq_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let command = args.command.unwrap_or(Command::All);
    let config = load_config(&args)?;

    // Open the database
    let store = SampleStore::open(&config.storage.path, &config.storage.store_options())
        .with_context(|| format!("opening database {}", config.storage.path.display()))?;

    let shutdown = CancellationToken::new();
    let state = AppState::with_clock(
        Arc::new(store),
        config,
        Arc::new(SystemClock),
        shutdown.clone(),
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    match command {
        Command::Sensor => run_sensor(state).await,
        Command::Web => run_web(state).await,
        Command::All => run_all(state).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Override config with CLI args
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.server.set_port(port);
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }
    if let Some(device) = &args.device {
        config.sensor.port = device.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn run_sensor(state: Arc<AppState>) -> anyhow::Result<()> {
    let sensor = &state.config.sensor;
    let device = SerialDevice::open(&sensor.port, sensor.serial_options())
        .with_context(|| format!("opening sensor on {}", sensor.port))?;

    state.ingestion_loop(device).run().await?;
    Ok(())
}

async fn run_web(state: Arc<AppState>) -> anyhow::Result<()> {
    let bind = state.config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {}", bind))?;

    info!("Starting server on {}", listener.local_addr()?);

    let shutdown = state.shutdown.clone();
    axum::serve(listener, airq_service::app(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Run ingestion and the server together; whichever stops first stops the
/// other.
async fn run_all(state: Arc<AppState>) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();

    let sensor = {
        let state = Arc::clone(&state);
        let shutdown = shutdown.clone();
        async move {
            let result = run_sensor(state).await;
            if let Err(e) = &result {
                error!("Ingestion failed, shutting down: {:#}", e);
            }
            shutdown.cancel();
            result
        }
    };
    let web = async move {
        let result = run_web(state).await;
        shutdown.cancel();
        result
    };

    let (sensor, web) = tokio::join!(sensor, web);
    sensor.and(web)
}
