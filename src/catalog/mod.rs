//! Configuration catalog mutations.
//!
//! # Responsibilities
//! - Validate and normalize data source codes
//! - Publish a new configuration adding a data source
//! - Make the mutating instance current before returning
//!
//! # Design Decisions
//! - Publishing is compare-and-publish against the identifier that was read;
//!   a concurrent writer causes a re-read, never a lost update
//! - Conflicts back off with jitter, bounded by a fixed attempt count

use thiserror::Error;

use crate::currency::{ConfigCurrency, DataSource};
use crate::resilience::backoff::calculate_backoff;
use crate::store::{ConfigBlob, ConfigId, DocumentError, StoreError};

const MAX_PUBLISH_ATTEMPTS: u32 = 5;
const BACKOFF_BASE_MS: u64 = 25;
const BACKOFF_MAX_MS: u64 = 500;
const MAX_CODE_LEN: usize = 25;

/// Errors from catalog mutations.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("invalid data source code [{code}]: {reason}")]
    InvalidCode { code: String, reason: &'static str },

    #[error("data source code [{0}] already exists")]
    AlreadyExists(String),

    #[error("configuration kept changing, gave up after {0} attempts")]
    Contended(u32),

    #[error("stored configuration {id} cannot be read: {reason}")]
    Corrupt { id: ConfigId, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of adding a data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceAdded {
    pub data_source: DataSource,
    pub config_id: ConfigId,
}

/// Trim, uppercase and check a data source code.
pub fn normalize_code(raw: &str) -> Result<String, CatalogError> {
    let code = raw.trim().to_ascii_uppercase();
    let invalid = |reason| CatalogError::InvalidCode { code: raw.to_string(), reason };

    if code.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if code.len() > MAX_CODE_LEN {
        return Err(invalid("must be at most 25 characters"));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(invalid("only letters, digits, '_' and '-' are allowed"));
    }
    Ok(code)
}

/// Publish a configuration declaring data source `raw_code`.
pub async fn add_data_source(currency: &ConfigCurrency, raw_code: &str) -> Result<DataSourceAdded, CatalogError> {
    let code = normalize_code(raw_code)?;
    let store = currency.store();

    for attempt in 1..=MAX_PUBLISH_ATTEMPTS {
        let base = store.fetch_current_identifier().await?;
        let blob = store.fetch_blob(base).await?;
        let mut document = blob.parse().map_err(|e| CatalogError::Corrupt {
            id: base,
            reason: e.to_string(),
        })?;

        let def = match document.add_data_source(&code) {
            Ok(def) => def,
            Err(DocumentError::DuplicateDataSource(_)) => {
                refresh_after_mutation(currency).await;
                return Err(CatalogError::AlreadyExists(code));
            }
            Err(e @ DocumentError::DataSourceIdsExhausted(_)) => {
                return Err(CatalogError::Corrupt {
                    id: base,
                    reason: e.to_string(),
                });
            }
        };
        let blob = ConfigBlob::from_document(&document).map_err(|e| CatalogError::Corrupt {
            id: base,
            reason: e.to_string(),
        })?;

        match store.publish_new_blob(base, blob).await {
            Ok(config_id) => {
                tracing::info!(code = %code, data_source_id = def.id, config_id = %config_id, "Data source added");
                refresh_after_mutation(currency).await;
                return Ok(DataSourceAdded {
                    data_source: DataSource {
                        data_source_code: def.code,
                        data_source_id: def.id,
                    },
                    config_id,
                });
            }
            Err(StoreError::Conflict { expected, actual }) => {
                let delay = calculate_backoff(attempt, BACKOFF_BASE_MS, BACKOFF_MAX_MS);
                tracing::debug!(
                    code = %code,
                    attempt,
                    expected = %expected,
                    actual = %actual,
                    delay_ms = delay.as_millis() as u64,
                    "Concurrent configuration change, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(CatalogError::Contended(MAX_PUBLISH_ATTEMPTS))
}

/// The publish already succeeded; a failed check here only delays when this
/// instance sees it.
async fn refresh_after_mutation(currency: &ConfigCurrency) {
    if let Err(e) = currency.force_refresh_check().await {
        tracing::warn!(error = %e, "Refresh after configuration change failed");
    }
}

/// Data sources of the current configuration, optionally checking the store first.
pub async fn list_data_sources(currency: &ConfigCurrency, fresh: bool) -> Result<(ConfigId, Vec<DataSource>), StoreError> {
    if fresh {
        if let Err(e) = currency.force_refresh_check().await {
            match e.unavailable_cause() {
                Some(cause) => return Err(cause.clone()),
                None => tracing::warn!(error = %e, "Refresh before listing failed, listing current configuration"),
            }
        }
    }
    let handle = currency.current();
    Ok((handle.id(), handle.data_sources().iter().cloned().collect()))
}
