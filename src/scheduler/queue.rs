//! Update queue: repositories waiting to be dispatched.
//!
//! Pop order: entries not yet updating come before in-flight ones, then
//! higher priority first, then lower sequence number first. A repo occupies
//! at most one slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use super::heap::IndexedHeap;
use super::info::RepoQueueState;
use crate::domain::{ConfiguredRepo, RepoId};

/// Dispatch priority of a queued update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Scheduled refreshes
    #[default]
    Low,
    /// Manual one-shot refreshes
    High,
}

/// A repository that has been queued for an update.
#[derive(Debug, Clone, Serialize)]
pub struct RepoUpdate {
    pub repo: ConfiguredRepo,
    pub priority: Priority,
    /// Insertion order within a priority band
    pub seq: u64,
    /// Whether the repo has been acquired for update
    pub updating: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct QueueHeap {
    entries: Vec<RepoUpdate>,
    index: HashMap<RepoId, usize>,
    seq: u64,
}

impl QueueHeap {
    fn position(&self, id: RepoId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

impl IndexedHeap for QueueHeap {
    type Item = RepoUpdate;

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn less(&self, i: usize, j: usize) -> bool {
        let (a, b) = (&self.entries[i], &self.entries[j]);
        if a.updating != b.updating {
            return b.updating;
        }
        if a.priority != b.priority {
            return a.priority > b.priority;
        }
        a.seq < b.seq
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.entries.swap(i, j);
        self.index.insert(self.entries[i].repo.id, i);
        self.index.insert(self.entries[j].repo.id, j);
    }

    fn push_entry(&mut self, item: RepoUpdate) {
        self.index.insert(item.repo.id, self.entries.len());
        self.entries.push(item);
    }

    fn pop_entry(&mut self) -> Option<RepoUpdate> {
        let item = self.entries.pop()?;
        self.index.remove(&item.repo.id);
        Some(item)
    }
}

struct QueueState {
    heap: QueueHeap,
    notify_enqueue: Arc<Notify>,
}

/// Priority queue of repos to update.
pub struct UpdateQueue {
    state: Mutex<QueueState>,
}

impl Default for UpdateQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: QueueHeap::default(),
                notify_enqueue: Arc::new(Notify::new()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Signalled whenever there may be new work to dispatch.
    pub fn notifier(&self) -> Arc<Notify> {
        self.lock().notify_enqueue.clone()
    }

    /// Add the repo to the queue with the given priority.
    ///
    /// A queued repo that isn't updating yet has its stored repo refreshed,
    /// and moves to the back of the higher band if `priority` is strictly
    /// higher than its current one. Returns whether the repo was already queued
    /// and not in flight.
    pub fn enqueue(&self, repo: &ConfiguredRepo, priority: Priority) -> bool {
        assert!(repo.id != 0, "repo.id is zero");

        let mut state = self.lock();
        let Some(pos) = state.heap.position(repo.id) else {
            let seq = state.heap.next_seq();
            state.heap.push(RepoUpdate {
                repo: repo.clone(),
                priority,
                seq,
                updating: false,
            });
            state.notify_enqueue.notify_one();
            return false;
        };

        if state.heap.entries[pos].updating {
            return false;
        }

        state.heap.entries[pos].repo = repo.clone();
        if priority <= state.heap.entries[pos].priority {
            return true;
        }

        let seq = state.heap.next_seq();
        let entry = &mut state.heap.entries[pos];
        entry.priority = priority;
        entry.seq = seq;
        state.heap.fix(pos);
        state.notify_enqueue.notify_one();
        true
    }

    /// Remove the repo only if its updating flag equals `updating`.
    pub fn remove(&self, repo: &ConfiguredRepo, updating: bool) -> bool {
        assert!(repo.id != 0, "repo.id is zero");

        let mut state = self.lock();
        match state.heap.position(repo.id) {
            Some(pos) if state.heap.entries[pos].updating == updating => {
                state.heap.remove(pos);
                true
            }
            _ => false,
        }
    }

    /// Acquire the next repo for update.
    ///
    /// The acquired repo stays queued as updating and must be removed with
    /// `remove(repo, true)` once the update finishes, whatever its outcome.
    pub fn acquire_next(&self) -> Option<ConfiguredRepo> {
        let mut state = self.lock();
        let root = state.heap.entries.first()?;
        if root.updating {
            // Everything in the queue is already updating.
            return None;
        }
        let repo = root.repo.clone();
        state.heap.entries[0].updating = true;
        state.heap.fix(0);
        Some(repo)
    }

    /// Drop every entry, restart sequencing and replace the notifier.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.heap = QueueHeap::default();
        state.notify_enqueue = Arc::new(Notify::new());
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

    pub fn info(&self, id: RepoId) -> Option<RepoQueueState> {
        let state = self.lock();
        let pos = state.heap.position(id)?;
        Some(RepoQueueState {
            index: pos,
            total: state.heap.len(),
            updating: state.heap.entries[pos].updating,
        })
    }

    /// All entries in dispatch order.
    pub fn snapshot(&self) -> Vec<RepoUpdate> {
        let mut copy = self.lock().heap.clone();
        std::iter::from_fn(|| copy.pop()).collect()
    }
}
