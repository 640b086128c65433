//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the configuration store named by the gateway config
//! - Bind the store's current configuration to the engine
//! - Start the store watcher when the store is a shared directory
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, including the first bind
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::schema::{GatewayConfig, StoreKind};
use crate::currency::{ConfigCurrency, RefreshError};
use crate::engine::{InMemoryEngine, ResolutionEngine};
use crate::store::file::FileConfigStore;
use crate::store::watcher::StoreWatcher;
use crate::store::{ConfigDocument, ConfigStore, InMemoryConfigStore, StoreClient, StoreError};

/// Errors that stop the gateway from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store.path is required for a file store")]
    MissingStorePath,

    #[error("cannot open configuration store: {0}")]
    Store(#[from] StoreError),

    #[error("cannot load initial configuration: {0}")]
    Bootstrap(#[from] RefreshError),

    #[error("cannot watch configuration store: {0}")]
    Watch(#[from] notify::Error),
}

/// Everything the HTTP server needs, assembled.
pub struct Gateway {
    pub config: Arc<GatewayConfig>,
    pub currency: ConfigCurrency,
    nudges: Option<mpsc::Receiver<()>>,
    watcher: Option<RecommendedWatcher>,
}

impl Gateway {
    /// Take the watcher's nudge receiver, if a watcher is running.
    pub fn take_nudges(&mut self) -> Option<mpsc::Receiver<()>> {
        self.nudges.take()
    }

    /// Take the watcher. Watching stops when it is dropped.
    pub fn take_watcher(&mut self) -> Option<RecommendedWatcher> {
        self.watcher.take()
    }
}

/// Build the gateway from its configuration.
pub async fn build(config: GatewayConfig) -> Result<Gateway, StartupError> {
    build_with_engine(config, Arc::new(InMemoryEngine::new())).await
}

/// Build the gateway from its configuration around `engine`.
pub async fn build_with_engine(
    config: GatewayConfig,
    engine: Arc<dyn ResolutionEngine>,
) -> Result<Gateway, StartupError> {
    match config.store.kind {
        StoreKind::Memory => {
            tracing::info!("Using in-memory configuration store");
            build_with(config, Arc::new(InMemoryConfigStore::new()), engine).await
        }
        StoreKind::File => {
            let dir = config.store.path.clone().ok_or(StartupError::MissingStorePath)?;
            let store = FileConfigStore::open_or_init(&dir, &ConfigDocument::initial()).await?;
            tracing::info!(dir = ?dir, "Using file configuration store");

            let watch = config.currency.watch_store;
            let mut gateway = build_with(config, Arc::new(store), engine).await?;
            if watch {
                let (watcher, nudges) = StoreWatcher::new(&dir);
                gateway.watcher = Some(watcher.run()?);
                gateway.nudges = Some(nudges);
            }
            Ok(gateway)
        }
    }
}

/// Build the gateway over an existing store and engine.
pub async fn build_with(
    config: GatewayConfig,
    store: Arc<dyn ConfigStore>,
    engine: Arc<dyn ResolutionEngine>,
) -> Result<Gateway, StartupError> {
    let client = StoreClient::new(store, Duration::from_millis(config.timeouts.store_ms));
    let currency = ConfigCurrency::bootstrap(client, engine, &config.currency).await?;

    Ok(Gateway {
        config: Arc::new(config),
        currency,
        nudges: None,
        watcher: None,
    })
}
