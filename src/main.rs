//! Resolver gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────┐
//!                     │                    RESOLVER GATEWAY                       │
//!                     │                                                           │
//!   Client Request    │  ┌─────────┐    ┌──────────┐    ┌──────────────────┐      │
//!  ───────────────────┼─▶│  http   │───▶│ handlers │───▶│  currency        │      │
//!                     │  │ server  │    │ catalog  │    │  retry policy    │      │
//!                     │  └─────────┘    └──────────┘    └────────┬─────────┘      │
//!                     │                                          │                │
//!                     │                      ┌───────────────────┼──────────┐     │
//!                     │                      ▼                   ▼          │     │
//!                     │              ┌──────────────┐   ┌──────────────┐    │     │
//!                     │              │ current      │   │ staleness    │    │     │
//!                     │              │ handle       │◀──│ detector +   │    │     │
//!                     │              │ (engine      │   │ coordinator  │    │     │
//!                     │              │  binding)    │   └──────┬───────┘    │     │
//!                     │              └──────────────┘          │            │     │
//!                     │                                        ▼            │     │
//!                     │                              ┌──────────────────┐   │     │
//!                     │                              │ store client     │───┼─────┼──▶ Config
//!                     │                              │ (deadline-bound) │   │     │    Store
//!                     │                              └──────────────────┘   │     │
//!                     │  ┌────────────────────────────────────────────────┐ │     │
//!                     │  │ config · observability · lifecycle · admin     │ │     │
//!                     │  └────────────────────────────────────────────────┘ │     │
//!                     └──────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use resolver_gateway::config::{load_config, GatewayConfig};
use resolver_gateway::http::HttpServer;
use resolver_gateway::lifecycle::{signals, startup, Shutdown};
use resolver_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "resolver-gateway")]
#[command(about = "HTTP gateway keeping an entity-resolution engine's configuration current", long_about = None)]
struct Args {
    /// Path to the gateway configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind.to_string();
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resolver-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        store = ?config.store.kind,
        refresh_interval_secs = config.currency.refresh_interval_secs,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let gateway = startup::build(config).await?;

    let shutdown = Shutdown::new();
    let signal_task = tokio::spawn(signals::listen(shutdown.clone(), gateway.currency.clone()));

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    HttpServer::new(gateway).run(listener, shutdown).await?;

    signal_task.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
