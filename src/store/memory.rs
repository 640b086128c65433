//! In-process configuration store.
//!
//! Holds every published blob keyed by identifier. Cloning the `Arc` that
//! wraps it lets several gateway instances in one process share a
//! repository, which is how the tests model a multi-instance deployment.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::store::{ConfigBlob, ConfigDocument, ConfigId, ConfigStore, StoreError, StoreResult};

#[derive(Debug)]
struct Versions {
    blobs: BTreeMap<ConfigId, ConfigBlob>,
    current: ConfigId,
}

/// A versioned store living in memory.
#[derive(Debug)]
pub struct InMemoryConfigStore {
    versions: RwLock<Versions>,
    available: AtomicBool,
}

impl InMemoryConfigStore {
    /// A store whose configuration 1 is [`ConfigDocument::initial`].
    pub fn new() -> Self {
        // The initial document always serializes.
        let blob = ConfigBlob::from_document(&ConfigDocument::initial())
            .unwrap_or_else(|_| ConfigBlob::new("{}"));
        Self::with_blob(blob)
    }

    /// A store whose configuration 1 is `blob`.
    pub fn with_blob(blob: ConfigBlob) -> Self {
        let mut blobs = BTreeMap::new();
        blobs.insert(ConfigId(1), blob);
        Self {
            versions: RwLock::new(Versions { blobs, current: ConfigId(1) }),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the repository becoming unreachable (or reachable again).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        tracing::debug!(available, "In-memory store availability changed");
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store is offline".to_string()))
        }
    }
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn current_identifier(&self) -> StoreResult<ConfigId> {
        self.ensure_available()?;
        Ok(self.versions.read().current)
    }

    async fn fetch_blob(&self, id: ConfigId) -> StoreResult<ConfigBlob> {
        self.ensure_available()?;
        self.versions
            .read()
            .blobs
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn publish_new_blob(&self, base: ConfigId, blob: ConfigBlob) -> StoreResult<ConfigId> {
        self.ensure_available()?;
        let mut versions = self.versions.write();
        if versions.current != base {
            return Err(StoreError::Conflict {
                expected: base,
                actual: versions.current,
            });
        }
        let id = base.successor()?;
        versions.blobs.insert(id, blob);
        versions.current = id;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_advances_current() {
        let store = InMemoryConfigStore::new();
        assert_eq!(store.current_identifier().await.unwrap(), ConfigId(1));

        let id = store.publish_new_blob(ConfigId(1), ConfigBlob::new("{}")).await.unwrap();
        assert_eq!(id, ConfigId(2));
        assert_eq!(store.current_identifier().await.unwrap(), ConfigId(2));
        assert_eq!(store.fetch_blob(ConfigId(2)).await.unwrap().as_str(), "{}");

        // Older versions stay readable
        assert!(store.fetch_blob(ConfigId(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_base_conflicts() {
        let store = InMemoryConfigStore::new();
        store.publish_new_blob(ConfigId(1), ConfigBlob::new("{}")).await.unwrap();

        let err = store.publish_new_blob(ConfigId(1), ConfigBlob::new("{}")).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { expected: ConfigId(1), actual: ConfigId(2) }
        ));
    }

    #[tokio::test]
    async fn test_outage() {
        let store = InMemoryConfigStore::new();
        store.set_available(false);
        assert!(store.current_identifier().await.unwrap_err().is_unavailable());
        assert!(store.fetch_blob(ConfigId(1)).await.unwrap_err().is_unavailable());

        store.set_available(true);
        assert!(store.current_identifier().await.is_ok());
    }
}
