//! Runs the scheduler loops against a stream of settings snapshots.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::limiter::MutableLimiter;
use super::update_scheduler::UpdateScheduler;
use crate::updater::RepoUpdater;

/// Concurrent update requests when none are configured.
pub const DEFAULT_MAX_CONCURRENT_CLONES: usize = 5;

/// The part of the configuration the scheduler reacts to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    pub disable_auto_git_updates: bool,
    pub git_max_concurrent_clones: usize,
}

impl SchedulerSettings {
    pub fn effective_concurrency(&self) -> usize {
        match self.git_max_concurrent_clones {
            0 => DEFAULT_MAX_CONCURRENT_CLONES,
            n => n,
        }
    }

    fn active(&self) -> ActiveConfig {
        ActiveConfig {
            running: true,
            auto_git_updates: !self.disable_auto_git_updates,
        }
    }
}

/// Loop configuration currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveConfig {
    running: bool,
    auto_git_updates: bool,
}

/// A started loop pair and the token that stops it.
struct RunningLoops {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl RunningLoops {
    fn start(
        scheduler: &Arc<UpdateScheduler>,
        config: ActiveConfig,
        limiter: &Arc<MutableLimiter>,
        updater: &Arc<dyn RepoUpdater>,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let mut handles = Vec::with_capacity(2);

        handles.push(tokio::spawn(Arc::clone(scheduler).run_update_loop(
            token.clone(),
            Arc::clone(limiter),
            Arc::clone(updater),
        )));

        if config.auto_git_updates {
            let scheduler = Arc::clone(scheduler);
            let token = token.clone();
            handles.push(tokio::spawn(async move { scheduler.run_schedule_loop(token).await }));
        }

        Self { token, handles }
    }

    async fn stop(self) {
        self.token.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler loop ended abnormally");
            }
        }
    }
}

/// Run the update loop, and the schedule loop while auto git updates are
/// enabled, until `cancel` fires.
///
/// Every settings snapshot resizes the limiter. A snapshot that changes the
/// active loop configuration stops the running pair before starting the new
/// one, then signals [`UpdateScheduler::restarts`].
pub async fn run_scheduler(
    scheduler: Arc<UpdateScheduler>,
    mut settings: watch::Receiver<SchedulerSettings>,
    updater: Arc<dyn RepoUpdater>,
    cancel: CancellationToken,
) {
    let limiter = MutableLimiter::new(settings.borrow().effective_concurrency());
    let mut have: Option<ActiveConfig> = None;
    let mut running: Option<RunningLoops> = None;

    loop {
        let current = settings.borrow_and_update().clone();
        limiter.set_limit(current.effective_concurrency());

        let want = current.active();
        if have != Some(want) {
            let restarted = match running.take() {
                Some(loops) => {
                    loops.stop().await;
                    info!("stopped previous scheduler");
                    true
                }
                None => false,
            };

            running = Some(RunningLoops::start(&scheduler, want, &limiter, &updater, &cancel));
            info!(auto_git_updates = want.auto_git_updates, "started configured scheduler");
            have = Some(want);

            if restarted {
                scheduler.mark_restarted();
            }
        }

        tokio::select! {
            changed = settings.changed() => {
                if changed.is_err() {
                    debug!("settings sender dropped, keeping current configuration");
                    cancel.cancelled().await;
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    if let Some(loops) = running.take() {
        loops.stop().await;
    }
    info!("scheduler stopped");
}
