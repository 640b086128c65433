//! Configuration store subsystem.
//!
//! # Data Flow
//! ```text
//! shared repository (memory / directory)
//!     → ConfigStore impl (memory.rs, file.rs)
//!     → client.rs (deadline per call, metrics, logging)
//!     → currency subsystem (detector, coordinator)
//!
//! Mutation path (catalog):
//!     client.fetch_blob(current) → ConfigDocument edit
//!     → client.publish_new_blob(base, blob) → new ConfigId
//! ```
//!
//! # Design Decisions
//! - Stores never cache; every call observes the repository as it is now
//! - Publishing is compare-and-publish against the caller's base identifier
//! - Unreachable stores and elapsed deadlines are both "unavailable"

pub mod blob;
pub mod client;
pub mod file;
pub mod memory;
pub mod watcher;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use blob::{AttributeTypeDef, ConfigBlob, ConfigDocument, DataSourceDef, DocumentError, EntityTypeDef};
pub use client::StoreClient;
pub use file::FileConfigStore;
pub use memory::InMemoryConfigStore;

/// Identifier of a published configuration version.
///
/// Identifiers are assigned by the store, strictly increase and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(pub u64);

impl ConfigId {
    /// The identifier that follows this one, if any is left.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// The identifier to publish after `self`, or [`StoreError::Corrupt`]
    /// when the store already holds the last one.
    pub fn successor(self) -> StoreResult<Self> {
        self.next()
            .ok_or_else(|| StoreError::Corrupt(format!("configuration identifiers exhausted at {self}")))
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ConfigId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Errors raised by configuration stores.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing repository could not be reached.
    #[error("configuration store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer before the deadline.
    #[error("configuration store timed out after {0:?}")]
    Timeout(Duration),

    /// No blob is published under the identifier.
    #[error("configuration {0} not found")]
    NotFound(ConfigId),

    /// Another writer published first.
    #[error("configuration changed concurrently: expected current {expected}, found {actual}")]
    Conflict { expected: ConfigId, actual: ConfigId },

    /// The repository holds data this store cannot interpret.
    #[error("configuration store is corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// True for failures that mean "the store could not be consulted".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A versioned configuration repository, possibly shared by several processes.
#[async_trait]
pub trait ConfigStore: Send + Sync + 'static {
    /// The identifier of the currently published configuration.
    async fn current_identifier(&self) -> StoreResult<ConfigId>;

    /// The blob published under `id`.
    async fn fetch_blob(&self, id: ConfigId) -> StoreResult<ConfigBlob>;

    /// Publish `blob` as the successor of `base`.
    ///
    /// Fails with [`StoreError::Conflict`] when `base` is no longer current.
    async fn publish_new_blob(&self, base: ConfigId, blob: ConfigBlob) -> StoreResult<ConfigId>;
}
