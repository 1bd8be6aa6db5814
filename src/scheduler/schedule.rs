//! Due-schedule: when each repository is next enqueued for an update.
//!
//! A min-heap of repos ordered by due time. Each entry carries its own
//! refresh interval, clamped to `[MIN_DELAY, MAX_DELAY]`. A one-shot timer
//! fires at the earliest due time and signals the wakeup [`Notify`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::heap::IndexedHeap;
use super::info::RepoScheduleState;
use crate::clock::Clock;
use crate::domain::{ConfiguredRepo, RepoId};

/// Minimum amount of time between scheduled updates of a single repository.
pub const MIN_DELAY: Duration = Duration::from_secs(45);

/// Maximum amount of time between scheduled updates of a single repository.
pub const MAX_DELAY: Duration = Duration::from_secs(8 * 60 * 60);

/// Tolerance under which an entry counts as due.
const DUE_SLACK: chrono::Duration = chrono::Duration::milliseconds(1);

/// Clamp a refresh interval into `[MIN_DELAY, MAX_DELAY]`.
pub fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_DELAY, MAX_DELAY)
}

/// The update schedule of a single repo.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledRepoUpdate {
    pub repo: ConfiguredRepo,
    /// How regularly the repo is updated
    pub interval: Duration,
    /// Next time the repo is enqueued for an update
    pub due: DateTime<Utc>,
}

/// Heap storage plus the ID → position index.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScheduleHeap {
    entries: Vec<ScheduledRepoUpdate>,
    index: HashMap<RepoId, usize>,
}

impl ScheduleHeap {
    fn position(&self, id: RepoId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    fn root(&self) -> Option<&ScheduledRepoUpdate> {
        self.entries.first()
    }
}

impl IndexedHeap for ScheduleHeap {
    type Item = ScheduledRepoUpdate;

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn less(&self, i: usize, j: usize) -> bool {
        self.entries[i].due < self.entries[j].due
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.entries.swap(i, j);
        self.index.insert(self.entries[i].repo.id, i);
        self.index.insert(self.entries[j].repo.id, j);
    }

    fn push_entry(&mut self, item: ScheduledRepoUpdate) {
        self.index.insert(item.repo.id, self.entries.len());
        self.entries.push(item);
    }

    fn pop_entry(&mut self) -> Option<ScheduledRepoUpdate> {
        let item = self.entries.pop()?;
        self.index.remove(&item.repo.id);
        Some(item)
    }
}

struct ScheduleState {
    heap: ScheduleHeap,
    timer: Option<JoinHandle<()>>,
    wakeup: Arc<Notify>,
}

/// Schedule of when repos get enqueued into the update queue.
pub struct Schedule {
    clock: Arc<dyn Clock>,
    state: Mutex<ScheduleState>,
}

impl Schedule {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(ScheduleState {
                heap: ScheduleHeap::default(),
                timer: None,
                wakeup: Arc::new(Notify::new()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScheduleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The signal the timer fires when the earliest entry becomes due.
    pub fn wakeup(&self) -> Arc<Notify> {
        self.lock().wakeup.clone()
    }

    /// Insert a repo due `MIN_DELAY` from now, or replace the stored repo of an
    /// existing entry without touching its interval or due time.
    ///
    /// Returns whether the repo was already scheduled.
    pub fn upsert(&self, repo: &ConfiguredRepo) -> bool {
        assert!(repo.id != 0, "repo.id is zero");

        let mut state = self.lock();
        if let Some(pos) = state.heap.position(repo.id) {
            state.heap.entries[pos].repo = repo.clone();
            return true;
        }

        let now = self.clock.now();
        state.heap.push(ScheduledRepoUpdate {
            repo: repo.clone(),
            interval: MIN_DELAY,
            due: now + to_chrono(MIN_DELAY),
        });
        self.reschedule_timer(&mut state);
        false
    }

    /// Set the refresh interval of a scheduled repo and make it due one
    /// interval from now. Repos no longer in the schedule are ignored.
    pub fn update_interval(&self, repo: &ConfiguredRepo, interval: Duration) {
        assert!(repo.id != 0, "repo.id is zero");

        let mut state = self.lock();
        let Some(pos) = state.heap.position(repo.id) else {
            return;
        };

        let interval = clamp_interval(interval);
        let now = self.clock.now();
        let entry = &mut state.heap.entries[pos];
        entry.interval = interval;
        entry.due = now + to_chrono(interval);
        debug!(repo = %repo.name, due_in_secs = interval.as_secs(), "updated repo interval");

        state.heap.fix(pos);
        self.reschedule_timer(&mut state);
    }

    /// Remove a repo. Returns false if it was not scheduled.
    pub fn remove(&self, repo: &ConfiguredRepo) -> bool {
        assert!(repo.id != 0, "repo.id is zero");

        let mut state = self.lock();
        let Some(pos) = state.heap.position(repo.id) else {
            return false;
        };

        state.heap.remove(pos);
        // Only the root decides the next wakeup.
        if pos == 0 {
            self.reschedule_timer(&mut state);
        }
        true
    }

    /// Take every entry that is due now, advancing each one by its interval.
    ///
    /// Entries are fixed in place rather than removed, and the timer is
    /// re-armed for the new earliest due time before returning.
    pub fn take_due(&self) -> Vec<ConfiguredRepo> {
        let mut state = self.lock();
        let mut due = Vec::new();

        while let Some(root) = state.heap.root() {
            let now = self.clock.now();
            if root.due >= now + DUE_SLACK {
                break;
            }
            due.push(root.repo.clone());
            let entry = &mut state.heap.entries[0];
            entry.due = now + to_chrono(entry.interval);
            state.heap.fix(0);
        }

        self.reschedule_timer(&mut state);
        due
    }

    /// Re-arm the wakeup timer for the current earliest entry.
    pub fn rearm(&self) {
        let mut state = self.lock();
        self.reschedule_timer(&mut state);
    }

    /// Drop every entry, stop the timer and replace the wakeup signal.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.heap = ScheduleHeap::default();
        state.wakeup = Arc::new(Notify::new());
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: RepoId) -> bool {
        self.lock().heap.position(id).is_some()
    }

    pub fn info(&self, id: RepoId) -> Option<RepoScheduleState> {
        let state = self.lock();
        let pos = state.heap.position(id)?;
        let entry = &state.heap.entries[pos];
        Some(RepoScheduleState {
            index: pos,
            total: state.heap.len(),
            interval_seconds: entry.interval.as_secs(),
            due: entry.due,
        })
    }

    /// All entries in the order they will become due.
    pub fn snapshot(&self) -> Vec<ScheduledRepoUpdate> {
        let mut copy = self.lock().heap.clone();
        std::iter::from_fn(|| copy.pop()).collect()
    }

    /// The caller holds the state lock.
    fn reschedule_timer(&self, state: &mut ScheduleState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let Some(root) = state.heap.root() else {
            return;
        };
        let delay = (root.due - self.clock.now()).to_std().unwrap_or(Duration::ZERO);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            trace!("no runtime available, wakeup timer left unarmed");
            return;
        };

        let wakeup = state.wakeup.clone();
        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            wakeup.notify_one();
        }));
    }
}

impl Drop for Schedule {
    fn drop(&mut self) {
        if let Some(timer) = self.lock().timer.take() {
            timer.abort();
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    fn repo(id: RepoId) -> ConfiguredRepo {
        ConfiguredRepo::new(id, format!("repo-{}", id), format!("https://example.com/{}", id))
    }

    fn setup() -> (Arc<ManualClock>, Schedule) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let schedule = Schedule::new(clock.clone());
        (clock, schedule)
    }

    #[test]
    fn test_upsert_new_repo_uses_min_delay() {
        let (clock, schedule) = setup();
        let now = clock.now();

        assert!(!schedule.upsert(&repo(1)));

        let info = schedule.info(1).unwrap();
        assert_eq!(info.interval_seconds, 45);
        assert_eq!(info.due, now + chrono::Duration::seconds(45));
        assert_eq!(info.total, 1);
    }

    #[test]
    fn test_upsert_existing_keeps_timing() {
        let (clock, schedule) = setup();
        schedule.upsert(&repo(1));
        let due = schedule.info(1).unwrap().due;

        clock.advance(chrono::Duration::seconds(10));
        let renamed = ConfiguredRepo::new(1, "renamed", "https://example.com/renamed");
        assert!(schedule.upsert(&renamed));

        let snapshot = schedule.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].repo.name, "renamed");
        assert_eq!(snapshot[0].due, due);
    }

    #[test]
    fn test_update_interval_clamps_low() {
        let (clock, schedule) = setup();
        schedule.upsert(&repo(1));
        clock.advance(chrono::Duration::seconds(5));

        schedule.update_interval(&repo(1), Duration::from_secs(1));

        let info = schedule.info(1).unwrap();
        assert_eq!(info.interval_seconds, MIN_DELAY.as_secs());
        assert_eq!(info.due, clock.now() + chrono::Duration::seconds(45));
    }

    #[test]
    fn test_update_interval_clamps_high() {
        let (clock, schedule) = setup();
        schedule.upsert(&repo(1));

        schedule.update_interval(&repo(1), Duration::from_secs(24 * 60 * 60));

        let info = schedule.info(1).unwrap();
        assert_eq!(info.interval_seconds, MAX_DELAY.as_secs());
        assert_eq!(info.due, clock.now() + chrono::Duration::hours(8));
    }

    #[test]
    fn test_update_interval_within_bounds_is_verbatim() {
        let (clock, schedule) = setup();
        schedule.upsert(&repo(1));

        // Ten hours since the last change halves to five.
        let interval = (chrono::Duration::hours(10) / 2).to_std().unwrap();
        schedule.update_interval(&repo(1), interval);

        let info = schedule.info(1).unwrap();
        assert_eq!(info.interval_seconds, 5 * 60 * 60);
        assert_eq!(info.due, clock.now() + chrono::Duration::hours(5));
    }

    #[test]
    fn test_update_interval_absent_repo_is_noop() {
        let (_clock, schedule) = setup();
        schedule.update_interval(&repo(9), Duration::from_secs(600));
        assert!(schedule.is_empty());
    }

    #[test]
    fn test_update_interval_reorders() {
        let (clock, schedule) = setup();
        schedule.upsert(&repo(1));
        clock.advance(chrono::Duration::seconds(1));
        schedule.upsert(&repo(2));

        schedule.update_interval(&repo(1), Duration::from_secs(3600));

        let order: Vec<RepoId> = schedule.snapshot().iter().map(|e| e.repo.id).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn test_remove() {
        let (_clock, schedule) = setup();
        schedule.upsert(&repo(1));
        assert!(schedule.remove(&repo(1)));
        assert!(!schedule.remove(&repo(1)));
        assert!(schedule.info(1).is_none());
    }

    #[test]
    #[should_panic(expected = "repo.id is zero")]
    fn test_upsert_zero_id_panics() {
        let (_clock, schedule) = setup();
        schedule.upsert(&repo(0));
    }

    #[test]
    fn test_take_due_advances_by_interval() {
        let (clock, schedule) = setup();
        schedule.upsert(&repo(1));
        schedule.upsert(&repo(2));
        schedule.update_interval(&repo(2), Duration::from_secs(600));

        assert!(schedule.take_due().is_empty());

        clock.advance(chrono::Duration::seconds(45));
        let due = schedule.take_due();
        assert_eq!(due.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);

        let info = schedule.info(1).unwrap();
        assert_eq!(info.due, clock.now() + chrono::Duration::seconds(45));
        assert_eq!(schedule.len(), 2);
    }

    #[test]
    fn test_take_due_drains_every_due_entry() {
        let (clock, schedule) = setup();
        for id in 1..=3 {
            schedule.upsert(&repo(id));
        }
        clock.advance(chrono::Duration::minutes(1));

        let mut due: Vec<RepoId> = schedule.take_due().iter().map(|r| r.id).collect();
        due.sort();
        assert_eq!(due, vec![1, 2, 3]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let (_clock, schedule) = setup();
        schedule.upsert(&repo(1));
        let before = schedule.wakeup();

        schedule.reset();

        assert!(schedule.is_empty());
        assert!(!Arc::ptr_eq(&before, &schedule.wakeup()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_wakeup() {
        let (_clock, schedule) = setup();
        let wakeup = schedule.wakeup();
        schedule.upsert(&repo(1));

        // The paused runtime advances straight to the timer deadline.
        tokio::time::timeout(Duration::from_secs(60), wakeup.notified())
            .await
            .expect("timer should fire");
    }

    #[tokio::test(start_paused = true)]
    async fn test_removing_root_disarms_timer() {
        let (_clock, schedule) = setup();
        let wakeup = schedule.wakeup();
        schedule.upsert(&repo(1));
        schedule.remove(&repo(1));

        let fired = tokio::time::timeout(Duration::from_secs(120), wakeup.notified()).await;
        assert!(fired.is_err());
    }

    proptest! {
        #[test]
        fn prop_snapshot_is_due_ordered(
            ops in proptest::collection::vec((0u32..3, 1u32..20, 0u64..40_000), 1..100)
        ) {
            let (clock, schedule) = setup();
            for (op, id, secs) in ops {
                let r = repo(id);
                match op {
                    0 => { schedule.upsert(&r); }
                    1 => { schedule.remove(&r); }
                    _ => schedule.update_interval(&r, Duration::from_secs(secs)),
                }
                clock.advance(chrono::Duration::milliseconds(10));
            }
            let snapshot = schedule.snapshot();
            prop_assert_eq!(snapshot.len(), schedule.len());
            for pair in snapshot.windows(2) {
                prop_assert!(pair[0].due <= pair[1].due);
            }
        }
    }
}
