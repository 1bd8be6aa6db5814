//! Read-only introspection types for the update scheduler.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::MetricsSnapshot;
use super::queue::RepoUpdate;
use super::schedule::ScheduledRepoUpdate;
use crate::domain::ConfiguredRepo;

/// Position of a repo in the due-schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoScheduleState {
    pub index: usize,
    pub total: usize,
    pub interval_seconds: u64,
    pub due: DateTime<Utc>,
}

/// Position of a repo in the update queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoQueueState {
    pub index: usize,
    pub total: usize,
    pub updating: bool,
}

/// Point-in-time scheduling state of a single repo. Either part is `None`
/// when the repo is absent from that structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoUpdateSchedulerInfo {
    pub schedule: Option<RepoScheduleState>,
    pub queue: Option<RepoQueueState>,
}

/// Full scheduler state for debugging.
///
/// `schedule` is in due order and `update_queue` in dispatch order. Each part
/// is copied under its own lock, so the parts are not mutually consistent.
#[derive(Debug, Clone, Serialize)]
pub struct DebugDumpSnapshot {
    pub update_queue: Vec<RepoUpdate>,
    pub schedule: Vec<ScheduledRepoUpdate>,
    pub source_repos: BTreeMap<String, Vec<ConfiguredRepo>>,
    pub metrics: MetricsSnapshot,
}
