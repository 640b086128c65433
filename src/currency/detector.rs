//! Staleness detection.
//!
//! # Responsibilities
//! - Compare a handle's identifier with the store's current identifier
//! - Ask the coordinator to publish the newer configuration when stale
//! - Run the same check periodically, on watcher nudges and on demand
//!
//! # Design Decisions
//! - One check function for every trigger; triggers only differ in labels
//! - A check with no store change has no side effects
//! - Periodic failures are logged and the loop carries on

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::currency::coordinator::{Reinitializer, RefreshError};
use crate::observability::metrics;
use crate::resilience::backoff::jittered_interval;
use crate::store::{ConfigId, StoreClient};

/// Outcome of a staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshCheck {
    pub was_stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_identifier: Option<ConfigId>,
}

impl RefreshCheck {
    pub fn fresh() -> Self {
        Self { was_stale: false, new_identifier: None }
    }

    pub fn refreshed(id: ConfigId) -> Self {
        Self { was_stale: true, new_identifier: Some(id) }
    }
}

/// What caused a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    /// The polling interval elapsed.
    Periodic,
    /// An operation failed with a possibly-stale error.
    OnDemand,
    /// Operator or tooling request.
    Forced,
    /// The store watcher saw a new blob.
    Watcher,
    /// SIGHUP.
    Signal,
}

impl RefreshTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshTrigger::Periodic => "periodic",
            RefreshTrigger::OnDemand => "on_demand",
            RefreshTrigger::Forced => "forced",
            RefreshTrigger::Watcher => "watcher",
            RefreshTrigger::Signal => "signal",
        }
    }
}

/// The most recent check, for status reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastCheck {
    pub trigger: RefreshTrigger,
    pub checked_at_unix: u64,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Detects stale configuration and triggers refreshes.
pub struct StalenessDetector {
    store: StoreClient,
    coordinator: Arc<Reinitializer>,
    checks: AtomicU64,
    last: Mutex<Option<LastCheck>>,
}

impl StalenessDetector {
    pub fn new(store: StoreClient, coordinator: Arc<Reinitializer>) -> Self {
        Self {
            store,
            coordinator,
            checks: AtomicU64::new(0),
            last: Mutex::new(None),
        }
    }

    /// Check whether `current_id` is stale and refresh if so.
    pub async fn check_and_refresh(&self, current_id: ConfigId) -> Result<RefreshCheck, RefreshError> {
        self.check(current_id, RefreshTrigger::OnDemand).await
    }

    /// Check the process's current configuration right now.
    pub async fn force_refresh_check(&self) -> Result<RefreshCheck, RefreshError> {
        self.check_now(RefreshTrigger::Forced).await
    }

    /// Check the process's current configuration, labelled with `trigger`.
    pub async fn check_now(&self, trigger: RefreshTrigger) -> Result<RefreshCheck, RefreshError> {
        self.check(self.coordinator.current_id(), trigger).await
    }

    /// Number of checks performed.
    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    pub fn last_check(&self) -> Option<LastCheck> {
        self.last.lock().clone()
    }

    async fn check(&self, current_id: ConfigId, trigger: RefreshTrigger) -> Result<RefreshCheck, RefreshError> {
        self.checks.fetch_add(1, Ordering::Relaxed);
        let result = self.evaluate(current_id).await;

        let outcome = match &result {
            Ok(check) if check.was_stale => "stale",
            Ok(_) => "fresh",
            Err(e) if e.is_store_unavailable() => "store_unavailable",
            Err(_) => "refresh_failed",
        };
        metrics::record_refresh_check(trigger.as_str(), outcome);

        *self.last.lock() = Some(LastCheck {
            trigger,
            checked_at_unix: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            outcome,
            error: result.as_ref().err().map(ToString::to_string),
        });
        result
    }

    async fn evaluate(&self, current_id: ConfigId) -> Result<RefreshCheck, RefreshError> {
        let latest = self.store.fetch_current_identifier().await?;
        if latest <= current_id {
            return Ok(RefreshCheck::fresh());
        }

        // The coordinator returns the existing handle when a concurrent
        // caller already published `latest`.
        let handle = self.coordinator.publish(latest).await?;
        tracing::info!(from = %current_id, to = %handle.id(), "Stale configuration refreshed");
        Ok(RefreshCheck::refreshed(handle.id()))
    }

    /// Run checks until shutdown.
    ///
    /// Checks run every `interval` (spread by `jitter_ratio`; zero disables
    /// polling) and whenever a nudge arrives.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        jitter_ratio: f64,
        mut nudges: Option<mpsc::Receiver<()>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        if interval.is_zero() && nudges.is_none() {
            tracing::info!("Periodic configuration checks disabled");
            return;
        }

        tracing::info!(interval_secs = interval.as_secs(), "Staleness detector starting");

        let polling = !interval.is_zero();
        let mut nudges_open = nudges.is_some();
        // Nudges do not move the polling schedule
        let mut next_poll = Instant::now() + jittered_interval(interval, jitter_ratio);

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_poll), if polling => {
                    self.run_check(RefreshTrigger::Periodic).await;
                    next_poll = Instant::now() + jittered_interval(interval, jitter_ratio);
                }
                nudge = next_nudge(&mut nudges), if nudges_open => {
                    match nudge {
                        Some(()) => self.run_check(RefreshTrigger::Watcher).await,
                        None => nudges_open = false,
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Staleness detector received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn run_check(&self, trigger: RefreshTrigger) {
        match self.check_now(trigger).await {
            Ok(check) if check.was_stale => {
                tracing::debug!(trigger = trigger.as_str(), new_id = ?check.new_identifier, "Background check refreshed configuration");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(trigger = trigger.as_str(), error = %e, "Background configuration check failed, keeping current configuration");
            }
        }
    }
}

impl std::fmt::Debug for StalenessDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StalenessDetector")
            .field("store", &self.store)
            .field("checks", &self.checks())
            .finish()
    }
}

async fn next_nudge(nudges: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match nudges {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InMemoryEngine;
    use crate::store::{ConfigBlob, ConfigStore, InMemoryConfigStore};

    async fn setup() -> (Arc<InMemoryConfigStore>, Arc<InMemoryEngine>, Arc<Reinitializer>, Arc<StalenessDetector>) {
        let store = Arc::new(InMemoryConfigStore::new());
        let engine = Arc::new(InMemoryEngine::new());
        let client = StoreClient::new(store.clone(), Duration::from_secs(1));
        let coordinator = Arc::new(Reinitializer::bootstrap(client.clone(), engine.clone()).await.unwrap());
        let detector = Arc::new(StalenessDetector::new(client, coordinator.clone()));
        (store, engine, coordinator, detector)
    }

    async fn add_data_source(store: &InMemoryConfigStore, code: &str) -> ConfigId {
        let base = store.current_identifier().await.unwrap();
        let mut doc = store.fetch_blob(base).await.unwrap().parse().unwrap();
        doc.add_data_source(code).unwrap();
        store
            .publish_new_blob(base, ConfigBlob::from_document(&doc).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_check_has_no_side_effects() {
        let (_store, engine, coordinator, detector) = setup().await;
        for _ in 0..5 {
            assert_eq!(detector.check_and_refresh(ConfigId(1)).await.unwrap(), RefreshCheck::fresh());
        }
        assert_eq!(engine.initializations(), 1);
        assert_eq!(coordinator.constructions(), 1);
        assert_eq!(detector.checks(), 5);
        assert_eq!(detector.last_check().unwrap().outcome, "fresh");
    }

    #[tokio::test]
    async fn test_stale_check_refreshes_once() {
        let (store, engine, coordinator, detector) = setup().await;
        let id = add_data_source(&store, "FOO").await;

        let check = detector.check_and_refresh(ConfigId(1)).await.unwrap();
        assert_eq!(check, RefreshCheck::refreshed(id));
        assert_eq!(coordinator.current_id(), id);

        // A second caller still holding the old id learns it was stale but
        // nothing is rebuilt.
        let check = detector.check_and_refresh(ConfigId(1)).await.unwrap();
        assert_eq!(check, RefreshCheck::refreshed(id));
        assert_eq!(engine.initializations(), 2);

        assert_eq!(detector.force_refresh_check().await.unwrap(), RefreshCheck::fresh());
        assert_eq!(engine.initializations(), 2);
    }

    #[tokio::test]
    async fn test_store_outage_is_reported() {
        let (store, _engine, coordinator, detector) = setup().await;
        store.set_available(false);

        let err = detector.force_refresh_check().await.unwrap_err();
        assert!(err.is_store_unavailable());
        assert_eq!(coordinator.current_id(), ConfigId(1));

        let last = detector.last_check().unwrap();
        assert_eq!(last.outcome, "store_unavailable");
        assert_eq!(last.trigger, RefreshTrigger::Forced);
        assert!(last.error.is_some());
    }

    #[tokio::test]
    async fn test_periodic_loop_picks_up_changes() {
        let (store, _engine, coordinator, detector) = setup().await;
        let (tx, _) = broadcast::channel(1);
        let task = tokio::spawn(detector.clone().run(Duration::from_millis(20), 0.0, None, tx.subscribe()));

        let id = add_data_source(&store, "FOO").await;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while coordinator.current_id() != id && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(coordinator.current_id(), id);
        assert!(detector.checks() >= 1);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_nudge_triggers_check() {
        let (store, _engine, coordinator, detector) = setup().await;
        let (shutdown_tx, _) = broadcast::channel(1);
        let (nudge_tx, nudge_rx) = mpsc::channel(1);
        let task = tokio::spawn(detector.clone().run(Duration::ZERO, 0.0, Some(nudge_rx), shutdown_tx.subscribe()));

        let id = add_data_source(&store, "FOO").await;
        nudge_tx.send(()).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while coordinator.current_id() != id && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(coordinator.current_id(), id);
        assert_eq!(detector.last_check().unwrap().trigger, RefreshTrigger::Watcher);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_nudges_do_not_postpone_polling() {
        let (_store, _engine, _coordinator, detector) = setup().await;
        let (shutdown_tx, _) = broadcast::channel(1);
        let (nudge_tx, nudge_rx) = mpsc::channel(1);
        let task = tokio::spawn(detector.clone().run(
            Duration::from_millis(100),
            0.0,
            Some(nudge_rx),
            shutdown_tx.subscribe(),
        ));

        // Nudge far more often than the interval while watching for a periodic check
        let mut saw_periodic = false;
        let start = tokio::time::Instant::now();
        let mut last_nudge = start;
        while !saw_periodic && start.elapsed() < Duration::from_secs(2) {
            if last_nudge.elapsed() >= Duration::from_millis(10) {
                let _ = nudge_tx.try_send(());
                last_nudge = tokio::time::Instant::now();
            }
            saw_periodic = detector
                .last_check()
                .is_some_and(|last| last.trigger == RefreshTrigger::Periodic);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(saw_periodic, "periodic check never ran while nudges kept arriving");

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_disabled_loop_returns_immediately() {
        let (_store, _engine, _coordinator, detector) = setup().await;
        let (tx, _) = broadcast::channel::<()>(1);
        tokio::time::timeout(Duration::from_secs(1), detector.run(Duration::ZERO, 0.0, None, tx.subscribe()))
            .await
            .unwrap();
    }
}
