//! File watcher for hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// A watcher over one snapshot's watch-path set.
///
/// Emits a unit event on any create/modify/delete under a watched path; the
/// supervisor decides what to do with it. Rebuilt on every reload so the
/// watch set always reflects the freshly loaded configuration.
pub struct ConfigWatcher {
    paths: Vec<PathBuf>,
    change_tx: mpsc::UnboundedSender<()>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for change notifications.
    pub fn new(paths: Vec<PathBuf>) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (Self { paths, change_tx }, change_rx)
    }

    /// Start watching in a background thread.
    ///
    /// The returned handle must be kept alive for the watch to stay active.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for path in &self.paths {
            let mode = if path.is_dir() {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            // Referenced-but-missing paths (e.g. assets yet to be created
            // under a watched folder) are skipped, not fatal.
            if let Err(e) = watcher.watch(path, mode) {
                tracing::warn!(path = ?path, error = %e, "could not watch path");
            }
        }

        tracing::info!(paths = self.paths.len(), "Watcher started");
        Ok(watcher)
    }
}
