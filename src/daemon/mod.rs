//! Daemon - wires configuration, the scheduler and the update service
//!
//! The daemon is the long-running process that:
//! - Re-reads the config file and publishes scheduler settings
//! - Reconciles configured sources into the scheduler at startup, on every
//!   config change and after every scheduler restart
//! - Runs the schedule and update loops
//! - Periodically writes a debug dump of the scheduler state

pub mod dump;
pub mod reconcile;

pub use dump::{read_debug_dump, write_debug_dump};
pub use reconcile::SourceReconciler;

use std::path::PathBuf;
use std::sync::Arc;

use eyre::{Context, Result};
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigWatcher, UpdaterConfig};
use crate::scheduler::{UpdateScheduler, run_scheduler};
use crate::updater::{HttpRepoUpdater, RepoUpdater};

fn ticker(period: std::time::Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// The repo-updater daemon.
pub struct Daemon {
    scheduler: Arc<UpdateScheduler>,
    updater: Arc<dyn RepoUpdater>,
    watcher: ConfigWatcher,
    config_rx: watch::Receiver<UpdaterConfig>,
}

impl Daemon {
    /// Create a daemon talking to the configured update service over HTTP.
    pub fn new(config_path: Option<PathBuf>, config: UpdaterConfig) -> Result<Self> {
        let updater = HttpRepoUpdater::new(config.updater_config()).context("Failed to build update client")?;
        info!(url = %updater.url(), "Using update service");
        Ok(Self::with_updater(config_path, config, Arc::new(updater), Arc::new(SystemClock)))
    }

    pub fn with_updater(
        config_path: Option<PathBuf>,
        config: UpdaterConfig,
        updater: Arc<dyn RepoUpdater>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (watcher, config_rx) = ConfigWatcher::new(config_path, config);
        Self {
            scheduler: Arc::new(UpdateScheduler::new(clock)),
            updater,
            watcher,
            config_rx,
        }
    }

    pub fn scheduler(&self) -> Arc<UpdateScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Run until `cancel` fires, then write a final debug dump.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let Self {
            scheduler,
            updater,
            watcher,
            mut config_rx,
        } = self;

        let mut config = config_rx.borrow_and_update().clone();
        let (settings_tx, settings_rx) = watch::channel(config.settings());
        let mut reconciler = SourceReconciler::new();
        let mut restarts = scheduler.restarts();
        restarts.mark_unchanged();

        let watcher_handle = tokio::spawn(watcher.run(cancel.clone()));
        let scheduler_handle = tokio::spawn(run_scheduler(
            Arc::clone(&scheduler),
            settings_rx,
            updater,
            cancel.clone(),
        ));

        reconciler.reconcile(&scheduler, &config);

        let mut dump = ticker(config.debug_dump.interval());
        info!(
            sources = config.sources.len(),
            dump_path = %config.debug_dump.resolved_path().display(),
            "Daemon started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = config_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = config_rx.borrow_and_update().clone();
                    if next.debug_dump.interval() != config.debug_dump.interval() {
                        dump = ticker(next.debug_dump.interval());
                    }
                    settings_tx.send_if_modified(|current| {
                        let settings = next.settings();
                        if *current == settings {
                            return false;
                        }
                        *current = settings;
                        true
                    });
                    reconciler.reconcile(&scheduler, &next);
                    config = next;
                }
                restarted = restarts.changed() => {
                    if restarted.is_err() {
                        break;
                    }
                    restarts.mark_unchanged();
                    info!("Scheduler restarted, re-seeding sources");
                    reconciler.reconcile(&scheduler, &config);
                }
                _ = dump.tick() => {
                    if let Err(e) = write_debug_dump(&scheduler, &config.debug_dump.resolved_path()) {
                        warn!(error = %e, "Failed to write debug dump");
                    }
                }
            }
        }

        cancel.cancel();
        if let Err(e) = watcher_handle.await {
            warn!(error = %e, "Config watcher ended abnormally");
        }
        scheduler_handle.await.context("Scheduler task failed")?;

        write_debug_dump(&scheduler, &config.debug_dump.resolved_path())?;
        info!("Daemon stopped");
        Ok(())
    }
}
