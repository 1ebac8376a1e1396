//! localp2p node daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                      NODE                        │
//!                 │                                                  │
//!   peers ◀──TCP──┼─▶ transport ──▶ message queue ──▶ consumer (log)  │
//!                 │    listener      (bounded)                       │
//!                 │    handshake                                     │
//!                 │    table ◀── reaper                              │
//!                 │       ▲                                          │
//!                 │       │                                          │
//!   CLI / SDK ────┼─▶ control plane ──▶ discovery directory          │
//!        HTTP     │    /rpc /health                                  │
//!                 │                                                  │
//!                 │  config · observability · lifecycle · security   │
//!                 └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use localp2p::config::loader::{default_config_path, load_or_init};
use localp2p::config::validation::validate_config;
use localp2p::lifecycle::{shutdown_signal, Node};
use localp2p::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "localp2p")]
#[command(about = "Local network peer-to-peer node", long_about = None)]
struct Args {
    /// Path to the config file (created with defaults if missing)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the transport listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the control plane port
    #[arg(long)]
    rpc_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = load_or_init(&config_path)?;
    if let Some(port) = args.port {
        config.transport.set_port(port);
    }
    if let Some(port) = args.rpc_port {
        config.control.set_port(port);
    }
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("Invalid configuration: {}", error);
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    logging::init_logging(&config.observability)?;

    tracing::info!("localp2p v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config = %config_path.display(),
        node_id = %config.node.id,
        bind_address = %config.transport.bind_address,
        control_enabled = config.control.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let node = Node::start(config).await?;

    if let Some(mut messages) = node.transport().messages() {
        tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                tracing::info!(
                    from = %message.from,
                    timestamp = %message.timestamp.to_rfc3339(),
                    content = %message.content,
                    "Message received"
                );
            }
        });
    }

    shutdown_signal().await;
    node.shutdown().await;
    Ok(())
}
