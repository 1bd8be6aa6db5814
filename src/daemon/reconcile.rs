//! Feeds configured sources into the scheduler.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::config::UpdaterConfig;
use crate::domain::SourceRepoMap;
use crate::scheduler::UpdateScheduler;

/// Tracks which sources have been handed to the scheduler so that a source
/// removed from the config gets reconciled with an empty map once.
#[derive(Debug, Default)]
pub struct SourceReconciler {
    known: BTreeSet<String>,
}

impl SourceReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push every configured source to the scheduler. Returns the number of
    /// sources reconciled, vanished ones included.
    pub fn reconcile(&mut self, scheduler: &UpdateScheduler, config: &UpdaterConfig) -> usize {
        let current = config.source_maps();
        let mut count = 0;

        for vanished in self.known.iter().filter(|name| !current.contains_key(*name)) {
            info!(source = %vanished, "source removed from config");
            scheduler.update_source(vanished, SourceRepoMap::new());
            count += 1;
        }

        for (source, repos) in current.iter() {
            scheduler.update_source(source, repos.clone());
            count += 1;
        }

        self.known = current.into_keys().collect();
        debug!(sources = self.known.len(), "reconciled configured sources");
        count
    }

    pub fn known(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }
}
