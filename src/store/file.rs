//! Directory-backed configuration store.
//!
//! # Layout
//! ```text
//! <dir>/config-00000000000000000001.json
//! <dir>/config-00000000000000000002.json   ← current (highest id)
//! ```
//!
//! # Design Decisions
//! - The current identifier is derived from the directory, never cached
//! - A publish writes a temp file and hard-links it to the target name; the
//!   link fails if the name exists, so racing processes conflict instead of
//!   overwriting each other
//! - Files that do not follow the naming scheme are ignored

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::store::{ConfigBlob, ConfigDocument, ConfigId, ConfigStore, StoreError, StoreResult};

const FILE_PREFIX: &str = "config-";
const FILE_SUFFIX: &str = ".json";

/// A configuration store shared through a directory.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    /// Open the store in `dir`. The directory must exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Open the store, creating the directory and publishing `initial` as
    /// configuration 1 when the directory holds no configuration yet.
    pub async fn open_or_init(dir: impl Into<PathBuf>, initial: &ConfigDocument) -> StoreResult<Self> {
        let store = Self::new(dir);
        fs::create_dir_all(&store.dir).await.map_err(|e| io_unavailable(&store.dir, e))?;

        if store.latest().await?.is_none() {
            let blob = ConfigBlob::from_document(initial).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            match store.link_new(ConfigId(1), &blob).await {
                Ok(()) => tracing::info!(dir = ?store.dir, "Initialized configuration directory"),
                // Another process initialized it first
                Err(StoreError::Conflict { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(store)
    }

    /// The watched directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: ConfigId) -> PathBuf {
        self.dir.join(format!("{}{:020}{}", FILE_PREFIX, id.0, FILE_SUFFIX))
    }

    async fn latest(&self) -> StoreResult<Option<ConfigId>> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| io_unavailable(&self.dir, e))?;
        let mut latest = None;
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_unavailable(&self.dir, e))? {
            if let Some(id) = entry.file_name().to_str().and_then(parse_file_name) {
                latest = latest.max(Some(id));
            }
        }
        Ok(latest)
    }

    async fn link_new(&self, id: ConfigId, blob: &ConfigBlob) -> StoreResult<()> {
        let target = self.path_for(id);
        let tmp = self.dir.join(format!(".{}.{}.tmp", id.0, uuid::Uuid::new_v4()));
        fs::write(&tmp, blob.as_str()).await.map_err(|e| io_unavailable(&tmp, e))?;

        let linked = fs::hard_link(&tmp, &target).await;
        let _ = fs::remove_file(&tmp).await;

        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StoreError::Conflict {
                expected: ConfigId(id.0.saturating_sub(1)),
                actual: id,
            }),
            Err(e) => Err(io_unavailable(&target, e)),
        }
    }
}

/// Parse `config-<id>.json`.
fn parse_file_name(name: &str) -> Option<ConfigId> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse::<u64>()
        .ok()
        .map(ConfigId)
}

fn io_unavailable(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn current_identifier(&self) -> StoreResult<ConfigId> {
        self.latest()
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("no configuration in {}", self.dir.display())))
    }

    async fn fetch_blob(&self, id: ConfigId) -> StoreResult<ConfigBlob> {
        let path = self.path_for(id);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(ConfigBlob::new(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(id)),
            Err(e) => Err(io_unavailable(&path, e)),
        }
    }

    async fn publish_new_blob(&self, base: ConfigId, blob: ConfigBlob) -> StoreResult<ConfigId> {
        let current = self.current_identifier().await?;
        if current != base {
            return Err(StoreError::Conflict { expected: base, actual: current });
        }
        let id = base.successor()?;
        match self.link_new(id, &blob).await {
            Ok(()) => Ok(id),
            Err(StoreError::Conflict { .. }) => Err(StoreError::Conflict { expected: base, actual: id }),
            Err(e) => Err(e),
        }
    }
}
