//! Reinitialization coordinator.
//!
//! # Responsibilities
//! - Own the process-wide "current" handle reference
//! - Build handles for newer configurations, at most once per identifier
//! - Publish new handles atomically, never regressing
//! - Track retired handles until their last holder lets go
//!
//! # Design Decisions
//! - `ArcSwap` holds the current handle: readers never take a lock
//! - Construction cells live in a `DashMap` keyed by identifier; the map is
//!   only touched to find or insert a cell, the fetch+parse+bind sequence
//!   runs outside any lock
//! - A failed construction leaves the cell empty so a later caller can try
//!   again; the current handle is untouched
//! - Retirement is passive: the old `Arc` is dropped here and the binding is
//!   released by whichever operation finishes with it last

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::currency::handle::{ActiveConfigHandle, BindError};
use crate::engine::ResolutionEngine;
use crate::observability::metrics;
use crate::store::{ConfigId, StoreClient, StoreError};

/// A refresh could not produce a new handle.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bind(#[from] BindError),
}

impl RefreshError {
    /// True when the store could not be consulted (unreachable or timed out).
    pub fn is_store_unavailable(&self) -> bool {
        self.unavailable_cause().is_some()
    }

    /// The store error, when the store could not be consulted.
    pub fn unavailable_cause(&self) -> Option<&StoreError> {
        match self {
            RefreshError::Store(e) if e.is_unavailable() => Some(e),
            _ => None,
        }
    }
}

type ConstructionCell = Arc<OnceCell<Arc<ActiveConfigHandle>>>;

/// Builds, publishes and retires configuration handles.
pub struct Reinitializer {
    store: StoreClient,
    engine: Arc<dyn ResolutionEngine>,
    current: ArcSwap<ActiveConfigHandle>,
    constructions: DashMap<ConfigId, ConstructionCell>,
    retiring: Mutex<Vec<Weak<ActiveConfigHandle>>>,
    built: AtomicU64,
}

impl Reinitializer {
    /// Bind the store's current configuration and make it the first current handle.
    pub async fn bootstrap(store: StoreClient, engine: Arc<dyn ResolutionEngine>) -> Result<Self, RefreshError> {
        let id = store.fetch_current_identifier().await?;
        let handle = construct(&store, &engine, id).await?;
        metrics::set_active_config(id.0);

        Ok(Self {
            store,
            engine,
            current: ArcSwap::new(handle),
            constructions: DashMap::new(),
            retiring: Mutex::new(Vec::new()),
            built: AtomicU64::new(1),
        })
    }

    /// The current handle. Holding the returned `Arc` keeps it alive across a swap.
    pub fn current(&self) -> Arc<ActiveConfigHandle> {
        self.current.load_full()
    }

    pub fn current_id(&self) -> ConfigId {
        self.current.load().id()
    }

    /// Make configuration `id` current, building its handle if needed.
    ///
    /// Returns the handle current after the call, whose identifier is at
    /// least `id`. Identifiers at or below the current one are a no-op.
    pub async fn publish(&self, id: ConfigId) -> Result<Arc<ActiveConfigHandle>, RefreshError> {
        let current = self.current();
        if id <= current.id() {
            return Ok(current);
        }

        let cell = self.constructions.entry(id).or_default().clone();

        // A publish that finished between the first check and the map lookup
        // has already pruned its cell; do not build a second handle.
        let current = self.current();
        if id <= current.id() {
            self.prune();
            return Ok(current);
        }

        let handle = cell
            .get_or_try_init(|| construct_counted(&self.store, &self.engine, &self.built, id))
            .await?
            .clone();
        self.install(handle);
        Ok(self.current())
    }

    /// Total handles constructed by this coordinator, including the first.
    pub fn constructions(&self) -> u64 {
        self.built.load(Ordering::SeqCst)
    }

    /// Identifiers of retired handles still held by in-flight operations.
    pub fn draining(&self) -> Vec<ConfigId> {
        let mut retiring = self.retiring.lock();
        retiring.retain(|weak| weak.strong_count() > 0);
        retiring
            .iter()
            .filter_map(Weak::upgrade)
            .map(|handle| handle.id())
            .collect()
    }

    fn install(&self, handle: Arc<ActiveConfigHandle>) {
        let id = handle.id();
        let previous = self
            .current
            .rcu(|current| if current.id() >= id { current.clone() } else { handle.clone() });

        if previous.id() < id {
            metrics::set_active_config(id.0);
            tracing::info!(from = %previous.id(), to = %id, "Published new active configuration");
            self.retire(previous);
        }
        self.prune();
    }

    fn retire(&self, previous: Arc<ActiveConfigHandle>) {
        let holders = Arc::strong_count(&previous) - 1;
        tracing::debug!(config_id = %previous.id(), holders, "Configuration retired, draining");

        let mut retiring = self.retiring.lock();
        retiring.retain(|weak| weak.strong_count() > 0);
        retiring.push(Arc::downgrade(&previous));
    }

    fn prune(&self) {
        let current_id = self.current_id();
        self.constructions.retain(|id, _| *id > current_id);
    }
}

async fn construct_counted(
    store: &StoreClient,
    engine: &Arc<dyn ResolutionEngine>,
    built: &AtomicU64,
    id: ConfigId,
) -> Result<Arc<ActiveConfigHandle>, RefreshError> {
    let handle = construct(store, engine, id).await?;
    built.fetch_add(1, Ordering::SeqCst);
    Ok(handle)
}

/// Fetch, parse and bind configuration `id`.
async fn construct(
    store: &StoreClient,
    engine: &Arc<dyn ResolutionEngine>,
    id: ConfigId,
) -> Result<Arc<ActiveConfigHandle>, RefreshError> {
    let blob = store.fetch_blob(id).await?;
    let engine = engine.clone();

    let bound = tokio::task::spawn_blocking(move || ActiveConfigHandle::bind(id, &blob, engine.as_ref()))
        .await
        .map_err(|e| BindError::Aborted { id, reason: e.to_string() })
        .and_then(|r| r);

    match bound {
        Ok(handle) => {
            metrics::record_handle_constructed(id.0);
            Ok(Arc::new(handle))
        }
        Err(e) => {
            metrics::record_bind_failure();
            tracing::warn!(config_id = %id, error = %e, "Failed to bind configuration");
            Err(e.into())
        }
    }
}

impl std::fmt::Debug for Reinitializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reinitializer")
            .field("current", &self.current_id())
            .field("constructions", &self.constructions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InMemoryEngine;
    use crate::store::{ConfigBlob, ConfigStore, InMemoryConfigStore};
    use std::time::Duration;

    async fn setup() -> (Arc<InMemoryConfigStore>, Arc<InMemoryEngine>, Reinitializer) {
        let store = Arc::new(InMemoryConfigStore::new());
        let engine = Arc::new(InMemoryEngine::new());
        let client = StoreClient::new(store.clone(), Duration::from_secs(1));
        let coordinator = Reinitializer::bootstrap(client, engine.clone()).await.unwrap();
        (store, engine, coordinator)
    }

    async fn publish_with(store: &InMemoryConfigStore, code: &str) -> ConfigId {
        let base = store.current_identifier().await.unwrap();
        let mut doc = store.fetch_blob(base).await.unwrap().parse().unwrap();
        doc.add_data_source(code).unwrap();
        store
            .publish_new_blob(base, ConfigBlob::from_document(&doc).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_binds_current() {
        let (_store, engine, coordinator) = setup().await;
        assert_eq!(coordinator.current_id(), ConfigId(1));
        assert_eq!(coordinator.constructions(), 1);
        assert_eq!(engine.live_bindings(), 1);
    }

    #[tokio::test]
    async fn test_publish_swaps_and_retires() {
        let (store, engine, coordinator) = setup().await;
        let held = coordinator.current();

        let id = publish_with(&store, "FOO").await;
        let handle = coordinator.publish(id).await.unwrap();
        assert_eq!(handle.id(), ConfigId(2));
        assert!(handle.data_sources().contains("FOO"));
        assert_eq!(coordinator.current_id(), ConfigId(2));

        // The old handle drains while it is still held
        assert_eq!(coordinator.draining(), vec![ConfigId(1)]);
        assert_eq!(engine.live_bindings(), 2);
        assert!(!held.data_sources().contains("FOO"));

        drop(held);
        assert!(coordinator.draining().is_empty());
        assert_eq!(engine.live_bindings(), 1);
    }

    #[tokio::test]
    async fn test_publish_never_regresses() {
        let (store, _engine, coordinator) = setup().await;
        publish_with(&store, "FOO").await;
        let id = publish_with(&store, "BAR").await;
        coordinator.publish(id).await.unwrap();

        let handle = coordinator.publish(ConfigId(2)).await.unwrap();
        assert_eq!(handle.id(), ConfigId(3));
        assert_eq!(coordinator.current_id(), ConfigId(3));
        assert_eq!(coordinator.constructions(), 2);
    }

    #[tokio::test]
    async fn test_republish_same_id_is_noop() {
        let (store, _engine, coordinator) = setup().await;
        let id = publish_with(&store, "FOO").await;
        coordinator.publish(id).await.unwrap();
        coordinator.publish(id).await.unwrap();
        assert_eq!(coordinator.constructions(), 2);
    }

    #[tokio::test]
    async fn test_bind_failure_keeps_current() {
        let (store, _engine, coordinator) = setup().await;
        let id = store.publish_new_blob(ConfigId(1), ConfigBlob::new("not json")).await.unwrap();

        let err = coordinator.publish(id).await.unwrap_err();
        assert!(matches!(err, RefreshError::Bind(BindError::Parse { .. })));
        assert!(!err.is_store_unavailable());
        assert_eq!(coordinator.current_id(), ConfigId(1));
        assert_eq!(coordinator.constructions(), 1);
    }

    #[tokio::test]
    async fn test_store_outage_keeps_current() {
        let (store, _engine, coordinator) = setup().await;
        let id = publish_with(&store, "FOO").await;
        store.set_available(false);

        let err = coordinator.publish(id).await.unwrap_err();
        assert!(err.is_store_unavailable());
        assert_eq!(coordinator.current_id(), ConfigId(1));

        // The empty cell does not block a later attempt
        store.set_available(true);
        assert_eq!(coordinator.publish(id).await.unwrap().id(), id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publish_builds_once() {
        let store = Arc::new(InMemoryConfigStore::new());
        let engine = Arc::new(InMemoryEngine::new().with_init_delay(Duration::from_millis(50)));
        let client = StoreClient::new(store.clone(), Duration::from_secs(5));
        let coordinator = Arc::new(Reinitializer::bootstrap(client, engine.clone()).await.unwrap());
        let id = publish_with(&store, "FOO").await;

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.publish(id).await.map(|h| h.id()) })
            })
            .collect();
        for result in futures_util::future::join_all(tasks).await {
            assert_eq!(result.unwrap().unwrap(), id);
        }

        assert_eq!(engine.initializations(), 2);
        assert_eq!(coordinator.constructions(), 2);
    }
}
