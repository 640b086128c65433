//! Configuration currency.
//!
//! Keeps the engine's loaded configuration in step with the configuration
//! store while requests run against it.
//!
//! # Data Flow
//! ```text
//! request
//!     → ConfigCurrency::with_current_configuration(op)
//!     → RetryPolicy: op(current handle)
//!         ok / non-stale error → returned as-is
//!         possibly stale       → StalenessDetector::check_and_refresh
//!                                  → store: current identifier
//!                                  → Reinitializer::publish (build once, swap)
//!                                → op(new current handle), once
//!
//! background
//!     interval / store watcher / SIGHUP / admin
//!     → StalenessDetector::check_now → same check as above
//! ```
//!
//! # Design Decisions
//! - The current handle is the only shared mutable state, swapped atomically
//! - Retired handles drain by reference count; nothing is evicted
//! - Every trigger goes through one check function

pub mod coordinator;
pub mod detector;
pub mod handle;
pub mod registry;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::schema::CurrencyConfig;
use crate::engine::{EngineResult, ResolutionEngine};
use crate::store::{ConfigId, StoreClient};

pub use coordinator::{RefreshError, Reinitializer};
pub use detector::{LastCheck, RefreshCheck, RefreshTrigger, StalenessDetector};
pub use handle::{ActiveConfigHandle, BindError};
pub use registry::{AttributeIndex, AttributeType, DataSource, DataSourceRegistry, RegistryError};
pub use retry::{OperationError, RetryPolicy, StaleClassifier};

/// Snapshot of the currency subsystem for status endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyStatus {
    pub config_id: ConfigId,
    pub data_sources: usize,
    pub handles_constructed: u64,
    pub draining: Vec<ConfigId>,
    pub checks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<LastCheck>,
}

/// The currency subsystem, assembled.
#[derive(Debug, Clone)]
pub struct ConfigCurrency {
    store: StoreClient,
    coordinator: Arc<Reinitializer>,
    detector: Arc<StalenessDetector>,
    policy: RetryPolicy,
    settings: CurrencyConfig,
}

impl ConfigCurrency {
    /// Bind the store's current configuration and wire the subsystem around it.
    pub async fn bootstrap(
        store: StoreClient,
        engine: Arc<dyn ResolutionEngine>,
        settings: &CurrencyConfig,
    ) -> Result<Self, RefreshError> {
        let coordinator = Arc::new(Reinitializer::bootstrap(store.clone(), engine).await?);
        let detector = Arc::new(StalenessDetector::new(store.clone(), coordinator.clone()));
        let classifier = StaleClassifier::new(settings.stale_error_codes.iter().copied());
        let policy = RetryPolicy::new(classifier, detector.clone(), coordinator.clone());

        tracing::info!(
            config_id = %coordinator.current_id(),
            stale_codes = ?settings.stale_error_codes,
            "Configuration currency ready"
        );

        Ok(Self {
            store,
            coordinator,
            detector,
            policy,
            settings: settings.clone(),
        })
    }

    /// The current handle.
    pub fn current(&self) -> Arc<ActiveConfigHandle> {
        self.coordinator.current()
    }

    /// Run `op` against the current configuration with stale-reference retry.
    pub async fn with_current_configuration<T, F>(&self, op: F) -> Result<T, OperationError>
    where
        F: Fn(&ActiveConfigHandle) -> EngineResult<T>,
    {
        self.policy.execute(op).await
    }

    /// Check the store now instead of waiting for the next poll.
    pub async fn force_refresh_check(&self) -> Result<RefreshCheck, RefreshError> {
        self.detector.force_refresh_check().await
    }

    pub fn store(&self) -> &StoreClient {
        &self.store
    }

    pub fn detector(&self) -> &Arc<StalenessDetector> {
        &self.detector
    }

    pub fn coordinator(&self) -> &Arc<Reinitializer> {
        &self.coordinator
    }

    /// Start the background check loop.
    pub fn spawn_periodic(
        &self,
        nudges: Option<mpsc::Receiver<()>>,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.settings.refresh_interval_secs);
        tokio::spawn(
            self.detector
                .clone()
                .run(interval, self.settings.jitter_ratio, nudges, shutdown),
        )
    }

    pub fn status(&self) -> CurrencyStatus {
        let current = self.current();
        CurrencyStatus {
            config_id: current.id(),
            data_sources: current.data_sources().len(),
            handles_constructed: self.coordinator.constructions(),
            draining: self.coordinator.draining(),
            checks: self.detector.checks(),
            last_check: self.detector.last_check(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineErrorKind, EngineOperation, InMemoryEngine};
    use crate::store::InMemoryConfigStore;
    use serde_json::json;

    async fn currency(settings: CurrencyConfig) -> ConfigCurrency {
        let store = StoreClient::new(Arc::new(InMemoryConfigStore::new()), Duration::from_secs(1));
        ConfigCurrency::bootstrap(store, Arc::new(InMemoryEngine::new()), &settings)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_configured_codes_drive_retry() {
        let settings = CurrencyConfig {
            stale_error_codes: vec![EngineErrorKind::UnknownEntityType.code()],
            ..CurrencyConfig::default()
        };
        let currency = currency(settings).await;
        assert!(!currency
            .policy
            .classifier()
            .is_possibly_stale(&crate::engine::EngineError::unknown_data_source("FOO")));
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let currency = currency(CurrencyConfig::default()).await;
        currency.force_refresh_check().await.unwrap();

        let status = currency.status();
        assert_eq!(status.config_id, ConfigId(1));
        assert_eq!(status.data_sources, 2);
        assert_eq!(status.handles_constructed, 1);
        assert_eq!(status.checks, 1);

        let body = serde_json::to_value(&status).unwrap();
        assert_eq!(body["configId"], json!(1));
        assert_eq!(body["lastCheck"]["trigger"], json!("forced"));
        assert_eq!(body["lastCheck"]["outcome"], json!("fresh"));
    }

    #[tokio::test]
    async fn test_with_current_configuration() {
        let currency = currency(CurrencyConfig::default()).await;
        let outcome = currency
            .with_current_configuration(|h| {
                h.execute(&EngineOperation::AddRecord {
                    data_source: "TEST".into(),
                    record_id: "1".into(),
                    record: json!({}),
                })
            })
            .await
            .unwrap();
        assert_eq!(outcome.data_source, "TEST");
    }
}
