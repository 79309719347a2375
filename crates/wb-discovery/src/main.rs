//! wb-discovery
//!
//! Announces Wiren Board devices to Home Assistant through MQTT discovery.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use wb_conventions::Namespace;

use wb_discovery::config::LogLevel;
use wb_discovery::transport::DryRunTransport;
use wb_discovery::transport::mqtt::{self, MqttTransport};
use wb_discovery::{Config, DiscoveryEngine, logging};

/// Capacity of the bus event channel
const EVENT_CAPACITY: usize = 1024;

/// Time the event loop gets to flush the final packets
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Wiren Board to Home Assistant MQTT discovery bridge
#[derive(Parser, Debug)]
#[command(name = "wb-discovery")]
#[command(about = "Wiren Board to Home Assistant MQTT discovery bridge", long_about = None)]
struct Args {
    /// Path to the configuration file (YAML or TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Log discovery publishes instead of sending them
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let config = Config::load(&args.config)
        .with_context(|| format!("Could not load config {}", args.config.display()))?;

    logging::init(
        args.log_level.unwrap_or(config.general.log_level),
        config.general.log_format,
    );

    info!("Starting wb-discovery v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Broker {}:{} as '{}'",
        config.broker.host, config.broker.port, config.broker.client_id
    );

    let (transport, eventloop) = mqtt::connect(&config.broker);
    let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
    let mut pump = mqtt::spawn_event_pump(eventloop, tx, config.broker.reconnect_delay());

    let namespace = Namespace::new(config.broker.topic_prefix.clone());

    if args.dry_run {
        info!("Dry run: discovery documents are logged, not published");
        let mut engine = DiscoveryEngine::new(
            DryRunTransport::new(transport.clone()),
            config.discovery.clone(),
            namespace,
        );
        engine.run(rx, shutdown_signal()).await;
    } else {
        let mut engine = DiscoveryEngine::new(transport.clone(), config.discovery.clone(), namespace);
        engine.run(rx, shutdown_signal()).await;
    }

    disconnect(&transport).await;
    if tokio::time::timeout(FLUSH_TIMEOUT, &mut pump).await.is_err() {
        warn!("MQTT event loop did not finish within {:?}", FLUSH_TIMEOUT);
        pump.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

async fn disconnect(transport: &MqttTransport) {
    if let Err(e) = transport.disconnect().await {
        warn!("Disconnect failed: {}", e);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
