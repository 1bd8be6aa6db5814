//! Config file watcher implementation

use std::path::PathBuf;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::UpdaterConfig;

/// Polls the config file and publishes every changed configuration.
pub struct ConfigWatcher {
    path: Option<PathBuf>,
    tx: watch::Sender<UpdaterConfig>,
}

impl ConfigWatcher {
    /// Create a watcher publishing `initial` until the file changes.
    ///
    /// Without a path there is nothing to re-read and `initial` stays current.
    pub fn new(path: Option<PathBuf>, initial: UpdaterConfig) -> (Self, watch::Receiver<UpdaterConfig>) {
        let (tx, rx) = watch::channel(initial);
        (Self { path, tx }, rx)
    }

    pub fn current(&self) -> UpdaterConfig {
        self.tx.borrow().clone()
    }

    /// Re-read the file once. Returns whether a changed config was published.
    ///
    /// A file that fails to load leaves the previous config in place.
    pub fn check_once(&self) -> bool {
        let Some(path) = &self.path else {
            return false;
        };

        let next = match UpdaterConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to reload config, keeping previous");
                return false;
            }
        };

        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        if changed {
            info!(path = %path.display(), "Config changed");
        } else {
            debug!(path = %path.display(), "Config unchanged");
        }
        changed
    }

    /// Run the polling loop until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(path = ?self.path, "ConfigWatcher started");

        loop {
            let interval = self.tx.borrow().reload_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => break,
            }
            self.check_once();
        }

        info!("ConfigWatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repo-updater.yml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_no_path_never_changes() {
        let (watcher, rx) = ConfigWatcher::new(None, UpdaterConfig::default());
        assert!(!watcher.check_once());
        assert_eq!(*rx.borrow(), UpdaterConfig::default());
    }

    #[test]
    fn test_unchanged_file_not_published() {
        let (_dir, path) = setup("git-max-concurrent-clones: 2\n");
        let initial = UpdaterConfig::load_from_file(&path).unwrap();
        let (watcher, mut rx) = ConfigWatcher::new(Some(path), initial);
        rx.mark_unchanged();

        assert!(!watcher.check_once());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_changed_file_published() {
        let (_dir, path) = setup("git-max-concurrent-clones: 2\n");
        let initial = UpdaterConfig::load_from_file(&path).unwrap();
        let (watcher, mut rx) = ConfigWatcher::new(Some(path.clone()), initial);
        rx.mark_unchanged();

        fs::write(&path, "git-max-concurrent-clones: 4\n").unwrap();

        assert!(watcher.check_once());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().git_max_concurrent_clones, 4);
    }

    #[test]
    fn test_invalid_file_keeps_previous() {
        let (_dir, path) = setup("git-max-concurrent-clones: 2\n");
        let initial = UpdaterConfig::load_from_file(&path).unwrap();
        let (watcher, _rx) = ConfigWatcher::new(Some(path.clone()), initial);

        fs::write(&path, "sources:\n  s:\n    - id: 0\n      name: broken\n").unwrap();

        assert!(!watcher.check_once());
        assert_eq!(watcher.current().git_max_concurrent_clones, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_picks_up_change() {
        let (_dir, path) = setup("reload-interval-secs: 1\n");
        let initial = UpdaterConfig::load_from_file(&path).unwrap();
        let (watcher, mut rx) = ConfigWatcher::new(Some(path.clone()), initial);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(cancel.clone()));

        fs::write(&path, "reload-interval-secs: 1\ndisable-auto-git-updates: true\n").unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), rx.changed())
            .await
            .expect("change should be published")
            .unwrap();
        assert!(rx.borrow().disable_auto_git_updates);

        cancel.cancel();
        handle.await.unwrap();
    }
}
