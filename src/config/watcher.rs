//! Configuration file watcher for hot reload.
//!
//! Watches the file's parent directory, since editors and deploy tools
//! usually replace the file by rename rather than writing it in place.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GuardConfig;

/// Emits a validated [`GuardConfig`] whenever the file changes meaningfully.
pub struct ConfigWatcher {
    path: PathBuf,
    current: Arc<Mutex<GuardConfig>>,
    update_tx: mpsc::UnboundedSender<GuardConfig>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`, seeded with the config already in use.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path, current: GuardConfig) -> (Self, mpsc::UnboundedReceiver<GuardConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            current: Arc::new(Mutex::new(current)),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned notify watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let watch_dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let Self { path, current, update_tx } = self;
        let handler_path = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify() || event.kind.is_create();
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant && ours {
                        reload(&handler_path, &current, &update_tx);
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

fn reload(path: &Path, current: &Mutex<GuardConfig>, tx: &mpsc::UnboundedSender<GuardConfig>) {
    match load_config(path) {
        Ok(new_config) => {
            let mut current = current.lock().unwrap_or_else(PoisonError::into_inner);
            if *current == new_config {
                tracing::debug!("Config file touched without changes");
                return;
            }
            *current = new_config.clone();
            tracing::info!("Config file changed, applying new configuration");
            let _ = tx.send(new_config);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_skips_unchanged_and_forwards_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.toml");
        std::fs::write(&path, "[retries]\nmax_attempts = 3\n").unwrap();

        let current = Mutex::new(GuardConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        reload(&path, &current, &tx);
        assert!(rx.try_recv().is_err());

        std::fs::write(&path, "[retries]\nmax_attempts = 7\n").unwrap();
        reload(&path, &current, &tx);
        assert_eq!(rx.try_recv().unwrap().retries.max_attempts, 7);

        std::fs::write(&path, "[retries]\nmax_attempts = 0\n").unwrap();
        reload(&path, &current, &tx);
        assert!(rx.try_recv().is_err());
        assert_eq!(current.lock().unwrap().retries.max_attempts, 7);
    }
}
