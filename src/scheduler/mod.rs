//! Repository update scheduler.
//!
//! This module provides:
//! - **Schedule**: a due-time heap that decides when each repo is refreshed
//!   next, with a backoff derived from how recently the repo changed.
//! - **UpdateQueue**: a priority heap of repos waiting to be dispatched.
//! - **MutableLimiter**: bounds concurrent update requests; resizable at runtime.
//! - **UpdateScheduler**: owns both heaps plus the last-known repos of each
//!   configuration source, and runs the schedule and update loops.
//!
//! # Architecture
//!
//! 1. Sources report their repos through `update_source`, `update` or `set`
//! 2. The schedule loop wakes at the earliest due time and enqueues due repos
//! 3. The update loop dequeues repos and dispatches them to a `RepoUpdater`
//! 4. Each response adjusts the repo's interval to half the time since its
//!    last change, clamped to `[MIN_DELAY, MAX_DELAY]`
//!
//! # Example
//!
//! ```ignore
//! use repo_updater::scheduler::{SchedulerSettings, UpdateScheduler, run_scheduler};
//!
//! let scheduler = Arc::new(UpdateScheduler::default());
//! let (tx, rx) = tokio::sync::watch::channel(SchedulerSettings::default());
//! tokio::spawn(run_scheduler(scheduler.clone(), rx, updater, cancel.clone()));
//!
//! scheduler.update_source("github", repos);
//! ```

mod heap;
mod info;
mod limiter;
mod metrics;
mod queue;
mod runner;
mod schedule;
mod update_scheduler;

pub use heap::IndexedHeap;
pub use info::{DebugDumpSnapshot, RepoQueueState, RepoScheduleState, RepoUpdateSchedulerInfo};
pub use limiter::{LimiterPermit, MutableLimiter};
pub use metrics::{MetricsSnapshot, SchedulerMetrics};
pub use queue::{Priority, RepoUpdate, UpdateQueue};
pub use runner::{DEFAULT_MAX_CONCURRENT_CLONES, SchedulerSettings, run_scheduler};
pub use schedule::{MAX_DELAY, MIN_DELAY, Schedule, ScheduledRepoUpdate, clamp_interval};
pub use update_scheduler::UpdateScheduler;
