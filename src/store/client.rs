//! Store client with per-call deadlines.
//!
//! # Responsibilities
//! - Query the current configuration identifier
//! - Fetch blobs by identifier
//! - Publish mutated blobs on behalf of the catalog
//! - Bound every call by the configured store timeout
//!
//! Nothing here retries: a failed call is reported to the caller as-is.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::observability::metrics;
use crate::resilience::timeouts::bounded;
use crate::store::{ConfigBlob, ConfigId, ConfigStore, StoreError, StoreResult};

/// Shared, cheaply cloneable handle to a configuration store.
#[derive(Clone)]
pub struct StoreClient {
    store: Arc<dyn ConfigStore>,
    timeout: Duration,
}

impl StoreClient {
    /// Wrap `store`, bounding each call by `timeout` (zero disables the bound).
    pub fn new(store: Arc<dyn ConfigStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// The identifier of the configuration currently published.
    pub async fn fetch_current_identifier(&self) -> StoreResult<ConfigId> {
        let start = Instant::now();
        let result = self.call(self.store.current_identifier()).await;
        Self::record("current_identifier", &result, start);
        result
    }

    /// The blob published under `id`.
    pub async fn fetch_blob(&self, id: ConfigId) -> StoreResult<ConfigBlob> {
        let start = Instant::now();
        let result = self.call(self.store.fetch_blob(id)).await;
        Self::record("fetch_blob", &result, start);
        if let Err(e) = &result {
            tracing::warn!(config_id = %id, error = %e, "Failed to fetch configuration blob");
        }
        result
    }

    /// Publish `blob` as the successor of `base`.
    pub async fn publish_new_blob(&self, base: ConfigId, blob: ConfigBlob) -> StoreResult<ConfigId> {
        let start = Instant::now();
        let result = self.call(self.store.publish_new_blob(base, blob)).await;
        Self::record("publish", &result, start);
        match &result {
            Ok(id) => tracing::info!(base = %base, config_id = %id, "Published configuration"),
            Err(e) => tracing::debug!(base = %base, error = %e, "Configuration publish rejected"),
        }
        result
    }

    /// The deadline applied to each call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn call<T>(&self, fut: impl std::future::Future<Output = StoreResult<T>>) -> StoreResult<T> {
        bounded(self.timeout, fut)
            .await
            .map_err(|elapsed| StoreError::Timeout(elapsed.0))?
    }

    fn record<T>(operation: &'static str, result: &StoreResult<T>, start: Instant) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) if e.is_unavailable() => "unavailable",
            Err(_) => "error",
        };
        metrics::record_store_query(operation, outcome, start);
    }
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("timeout", &self.timeout)
            .finish()
    }
}
