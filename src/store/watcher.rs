//! Directory watcher for the file-backed store.
//!
//! Another process publishing into the shared directory is noticed here and
//! turned into a nudge for the staleness detector, so the new configuration
//! is picked up without waiting for the next periodic check.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Watches a store directory and nudges the staleness detector.
pub struct StoreWatcher {
    dir: PathBuf,
    nudge_tx: mpsc::Sender<()>,
}

impl StoreWatcher {
    /// Create a new StoreWatcher.
    ///
    /// Returns the watcher and a receiver of nudges. Bursts of file events
    /// coalesce into a single pending nudge.
    pub fn new(dir: &Path) -> (Self, mpsc::Receiver<()>) {
        let (nudge_tx, nudge_rx) = mpsc::channel(1);

        (Self {
            dir: dir.to_path_buf(),
            nudge_tx,
        }, nudge_rx)
    }

    /// Start watching the directory in a background thread.
    ///
    /// Watching stops when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.nudge_tx.clone();

        let mut watcher = RecommendedWatcher::new(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if is_publication(&event) {
                        tracing::debug!(paths = ?event.paths, "Configuration file published, nudging detector");
                        // A full channel already holds a pending nudge
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => tracing::error!("Store watch error: {:?}", e),
            }
        }, Config::default().with_poll_interval(Duration::from_secs(2)))?;

        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;

        tracing::info!(dir = ?self.dir, "Store watcher started");
        Ok(watcher)
    }
}

/// Create or modify events on `config-*.json` files.
fn is_publication(event: &Event) -> bool {
    (event.kind.is_create() || event.kind.is_modify())
        && event.paths.iter().any(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("config-") && n.ends_with(".json"))
                .unwrap_or(false)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind, RemoveKind};

    #[test]
    fn test_publication_filter() {
        let create = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/s/config-00000000000000000002.json"));
        assert!(is_publication(&create));

        let tmp = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/s/.2.x.tmp"));
        assert!(!is_publication(&tmp));

        let remove = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/s/config-00000000000000000002.json"));
        assert!(!is_publication(&remove));
    }

    #[tokio::test]
    async fn test_watcher_nudges_on_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, mut rx) = StoreWatcher::new(dir.path());
        let _guard = watcher.run().unwrap();

        std::fs::write(dir.path().join("config-00000000000000000002.json"), "{}").unwrap();

        let nudged = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await;
        assert!(matches!(nudged, Ok(Some(()))));
    }
}
