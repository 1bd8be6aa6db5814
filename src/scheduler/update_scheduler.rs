//! Update scheduler implementation
//!
//! Updates are scheduled based on the time that has elapsed since the last
//! change of a repo, divided by two. If a repo last changed 8 hours before it
//! was fetched, the next update is due 4 hours later; if nothing changed by
//! then, the one after is due 6 hours later. The interval is clamped to
//! `[MIN_DELAY, MAX_DELAY]`.
//!
//! When a repo becomes due, the schedule loop moves it into the update queue.
//! The update loop dequeues repos and dispatches updates, bounded by a
//! [`MutableLimiter`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::info::{DebugDumpSnapshot, RepoUpdateSchedulerInfo};
use super::limiter::{LimiterPermit, MutableLimiter};
use super::metrics::SchedulerMetrics;
use super::queue::{Priority, UpdateQueue};
use super::schedule::Schedule;
use crate::clock::{Clock, SystemClock};
use crate::domain::{ConfiguredRepo, Repo, RepoId, SourceRepoMap};
use crate::error::UpdaterError;
use crate::updater::RepoUpdater;

/// Minimum age of the last fetch before the update service fetches again.
const UPDATE_SINCE: Duration = Duration::from_secs(1);

/// Schedules repo update requests.
pub struct UpdateScheduler {
    /// Last known repos of each configuration source
    source_repos: Mutex<HashMap<String, SourceRepoMap>>,
    schedule: Schedule,
    update_queue: UpdateQueue,
    metrics: SchedulerMetrics,
    /// Bumped every time a stopped loop pair is replaced
    restarts: watch::Sender<u64>,
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl UpdateScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            source_repos: Mutex::new(HashMap::new()),
            schedule: Schedule::new(clock),
            update_queue: UpdateQueue::new(),
            metrics: SchedulerMetrics::new(),
            restarts: watch::Sender::new(0),
        }
    }

    fn lock_sources(&self) -> MutexGuard<'_, HashMap<String, SourceRepoMap>> {
        self.source_repos.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn update_queue(&self) -> &UpdateQueue {
        &self.update_queue
    }

    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    /// Changes whenever the loops were restarted. Stopped loops reset both
    /// heaps, so subscribers re-feed their repos on every change.
    pub fn restarts(&self) -> watch::Receiver<u64> {
        self.restarts.subscribe()
    }

    pub(crate) fn mark_restarted(&self) {
        self.restarts.send_modify(|n| *n += 1);
    }

    /// Apply a batch of repo records: deleted repos stop being scheduled,
    /// everything else is scheduled and queued at low priority.
    pub fn update(&self, repos: &[Repo]) {
        let _sources = self.lock_sources();

        let mut known = 0;
        for r in repos {
            let repo = ConfiguredRepo::from(r);
            if r.is_deleted() {
                self.remove(&repo);
            } else {
                known += 1;
                self.upsert(&repo);
            }
        }

        self.metrics.set_known_repos(known);
    }

    /// Like [`update`](Self::update), but `repos` is the known universe of
    /// repositories rather than a subset.
    pub fn set(&self, repos: &[Repo]) {
        debug!(count = repos.len(), "setting known repos");
        self.update(repos);
    }

    fn upsert(&self, repo: &ConfiguredRepo) {
        let updated = self.schedule.upsert(repo);
        debug!(repo = %repo.name, updated, "scheduler.schedule.upserted");

        let updated = self.update_queue.enqueue(repo, Priority::Low);
        debug!(repo = %repo.name, updated, "scheduler.update_queue.enqueued");
    }

    fn remove(&self, repo: &ConfiguredRepo) {
        if self.schedule.remove(repo) {
            debug!(repo = %repo.name, "scheduler.schedule.removed");
        }

        if self.update_queue.remove(repo, false) {
            debug!(repo = %repo.name, "scheduler.update_queue.removed");
        }
    }

    /// Replace the known repos of `source`.
    ///
    /// Repos that disappeared from the source or were disabled are removed;
    /// in-flight updates are left for the dispatcher to clean up. Every
    /// enabled repo is scheduled and queued at low priority.
    pub fn update_source(&self, source: &str, new_list: SourceRepoMap) {
        let mut sources = self.lock_sources();
        debug!(source, count = new_list.len(), "updating configured repos");

        if let Some(old_list) = sources.get(source) {
            for (name, repo) in old_list {
                let still_enabled = new_list.get(name).is_some_and(|r| r.enabled);
                if !still_enabled {
                    self.schedule.remove(repo);
                    self.update_queue.remove(repo, false);
                }
            }
        }

        for repo in new_list.values().filter(|r| r.enabled) {
            self.schedule.upsert(repo);
            self.update_queue.enqueue(repo, Priority::Low);
        }

        self.metrics.set_known_repos(new_list.len());
        sources.insert(source.to_string(), new_list);
    }

    /// Names of every source reconciled so far.
    pub fn sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_sources().keys().cloned().collect();
        names.sort();
        names
    }

    /// Request a single update of the given repo without touching its
    /// position in the schedule.
    pub fn update_once(&self, id: RepoId, name: impl Into<String>, url: impl Into<String>) {
        let repo = ConfiguredRepo::new(id, name, url);
        self.metrics.inc_manual_fetches();
        self.update_queue.enqueue(&repo, Priority::High);
    }

    /// Current scheduling state of a repo.
    pub fn schedule_info(&self, id: RepoId) -> RepoUpdateSchedulerInfo {
        RepoUpdateSchedulerInfo {
            schedule: self.schedule.info(id),
            queue: self.update_queue.info(id),
        }
    }

    /// Snapshot of the whole scheduler, ordered the way entries will fire
    /// and dispatch.
    pub fn debug_dump(&self) -> DebugDumpSnapshot {
        let source_repos: BTreeMap<String, Vec<ConfiguredRepo>> = {
            let sources = self.lock_sources();
            sources
                .iter()
                .map(|(source, repos)| {
                    let mut list: Vec<ConfiguredRepo> = repos.values().cloned().collect();
                    list.sort_by(|a, b| a.name.cmp(&b.name));
                    (source.clone(), list)
                })
                .collect()
        };

        DebugDumpSnapshot {
            schedule: self.schedule.snapshot(),
            update_queue: self.update_queue.snapshot(),
            source_repos,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Move due repos into the update queue until cancelled.
    pub async fn run_schedule_loop(&self, cancel: CancellationToken) {
        info!("schedule loop started");
        // Entries added before a runtime was available have no timer yet.
        self.schedule.rearm();

        loop {
            let wakeup = self.schedule.wakeup();
            tokio::select! {
                _ = wakeup.notified() => {}
                _ = cancel.cancelled() => {
                    self.schedule.reset();
                    info!("schedule loop stopped");
                    return;
                }
            }

            self.run_schedule();
            self.metrics.inc_schedule_loops();
        }
    }

    /// Enqueue every repo that is due now.
    pub fn run_schedule(&self) {
        for repo in self.schedule.take_due() {
            self.metrics.inc_auto_fetches();
            self.update_queue.enqueue(&repo, Priority::Low);
        }
    }

    /// Dispatch queued repos to `updater` until cancelled.
    pub async fn run_update_loop(
        self: Arc<Self>,
        cancel: CancellationToken,
        limiter: Arc<MutableLimiter>,
        updater: Arc<dyn RepoUpdater>,
    ) {
        info!("update loop started");

        loop {
            let notify = self.update_queue.notifier();
            tokio::select! {
                _ = notify.notified() => {}
                _ = cancel.cancelled() => break,
            }

            loop {
                let permit = match limiter.acquire(&cancel).await {
                    Ok(permit) => permit,
                    Err(_) => {
                        self.update_queue.reset();
                        info!("update loop stopped");
                        return;
                    }
                };

                let Some(repo) = self.update_queue.acquire_next() else {
                    drop(permit);
                    break;
                };

                let scheduler = Arc::clone(&self);
                let updater = Arc::clone(&updater);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    scheduler.dispatch(updater.as_ref(), repo, permit, cancel).await;
                });
            }
        }

        self.update_queue.reset();
        info!("update loop stopped");
    }

    async fn dispatch(
        &self,
        updater: &dyn RepoUpdater,
        repo: ConfiguredRepo,
        permit: LimiterPermit,
        cancel: CancellationToken,
    ) {
        let result = tokio::select! {
            result = updater.request_repo_update(&repo, UPDATE_SINCE) => result,
            _ = cancel.cancelled() => Err(UpdaterError::Cancelled),
        };

        match result {
            Ok(response) => {
                if let Some(interval) = response.suggested_interval() {
                    // Negative gaps collapse to zero and get clamped up.
                    let interval = interval.to_std().unwrap_or(Duration::ZERO);
                    self.schedule.update_interval(&repo, interval);
                }
            }
            Err(UpdaterError::Cancelled) => {
                debug!(repo = %repo.name, "repo update cancelled");
            }
            Err(e) => {
                self.metrics.inc_errors();
                warn!(repo = %repo.name, error = %e, "error requesting repo update");
            }
        }

        self.update_queue.remove(&repo, true);
        drop(permit);
    }
}
