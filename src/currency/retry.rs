//! Stale-reference retry policy.
//!
//! # Responsibilities
//! - Run an engine operation against the current handle
//! - Classify its failure by engine error code
//! - On a possibly-stale failure, check for a newer configuration and retry
//!   exactly once against it
//!
//! # Design Decisions
//! - Classification is a set of numeric codes, configurable, never message text
//! - No backoff and no loop: a refresh either resolved the reference or it did not
//! - A store outage during the check is reported alongside the original error

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::currency::coordinator::Reinitializer;
use crate::currency::detector::StalenessDetector;
use crate::currency::handle::ActiveConfigHandle;
use crate::engine::{EngineError, EngineErrorKind, EngineResult};
use crate::observability::metrics;
use crate::store::StoreError;

/// Engine error codes that may mean "your configuration is out of date".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleClassifier {
    codes: BTreeSet<u32>,
}

impl StaleClassifier {
    pub fn new(codes: impl IntoIterator<Item = u32>) -> Self {
        Self { codes: codes.into_iter().collect() }
    }

    pub fn is_possibly_stale(&self, error: &EngineError) -> bool {
        self.codes.contains(&error.code())
    }

    pub fn codes(&self) -> &BTreeSet<u32> {
        &self.codes
    }
}

impl Default for StaleClassifier {
    fn default() -> Self {
        Self::new([
            EngineErrorKind::UnknownDataSource.code(),
            EngineErrorKind::UnknownEntityType.code(),
        ])
    }
}

/// Failure of a retry-wrapped operation.
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    /// The engine's error, unchanged.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The operation failed and the store could not be consulted to see if
    /// a newer configuration would fix it.
    #[error("{error} (configuration refresh failed: {cause})")]
    RefreshFailed {
        error: EngineError,
        #[source]
        cause: StoreError,
    },
}

impl OperationError {
    /// The originating engine error.
    pub fn engine_error(&self) -> &EngineError {
        match self {
            OperationError::Engine(error) => error,
            OperationError::RefreshFailed { error, .. } => error,
        }
    }

    pub fn refresh_cause(&self) -> Option<&StoreError> {
        match self {
            OperationError::Engine(_) => None,
            OperationError::RefreshFailed { cause, .. } => Some(cause),
        }
    }
}

/// Runs operations with at most one stale-triggered retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    classifier: StaleClassifier,
    detector: Arc<StalenessDetector>,
    coordinator: Arc<Reinitializer>,
}

impl RetryPolicy {
    pub fn new(classifier: StaleClassifier, detector: Arc<StalenessDetector>, coordinator: Arc<Reinitializer>) -> Self {
        Self {
            classifier,
            detector,
            coordinator,
        }
    }

    pub fn classifier(&self) -> &StaleClassifier {
        &self.classifier
    }

    /// Run `op` against the current handle, retrying once if its failure was
    /// caused by a configuration this process had not loaded yet.
    pub async fn execute<T, F>(&self, op: F) -> Result<T, OperationError>
    where
        F: Fn(&ActiveConfigHandle) -> EngineResult<T>,
    {
        let first = self.coordinator.current();
        let error = match op(&first) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !self.classifier.is_possibly_stale(&error) {
            return Err(error.into());
        }

        let seen = first.id();
        // The check may retire `first`; holding it past here only delays the drain.
        drop(first);

        match self.detector.check_and_refresh(seen).await {
            Ok(check) if check.was_stale => {
                let current = self.coordinator.current();
                tracing::debug!(
                    from = %seen,
                    to = %current.id(),
                    code = error.code(),
                    "Retrying operation against refreshed configuration"
                );
                let retried = op(&current);
                metrics::record_stale_retry(if retried.is_ok() { "recovered" } else { "failed" });
                retried.map_err(OperationError::from)
            }
            Ok(_) => {
                metrics::record_stale_retry("not_stale");
                Err(error.into())
            }
            Err(refresh) => match refresh.unavailable_cause() {
                Some(cause) => {
                    metrics::record_stale_retry("store_unavailable");
                    tracing::warn!(config_id = %seen, error = %error, cause = %cause, "Could not check configuration currency");
                    Err(OperationError::RefreshFailed { error, cause: cause.clone() })
                }
                None => {
                    metrics::record_stale_retry("bind_failed");
                    tracing::warn!(config_id = %seen, error = %refresh, "Refresh failed, returning original error");
                    Err(error.into())
                }
            },
        }
    }
}
