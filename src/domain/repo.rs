//! Repository identity types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric repository ID. Zero is never a valid key.
pub type RepoId = u32;

/// The repositories associated with a configuration source, keyed by name.
pub type SourceRepoMap = HashMap<String, ConfiguredRepo>;

/// The configuration data of a repository as seen by the scheduler.
///
/// Captured values are replaced wholesale when a newer snapshot arrives and
/// are never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredRepo {
    pub id: RepoId,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ConfiguredRepo {
    /// Create an enabled repo.
    pub fn new(id: RepoId, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            enabled: true,
        }
    }

    /// Builder-style toggle of the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A repository record from the upstream store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repo {
    pub id: RepoId,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub clone_urls: Vec<String>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Repo {
    /// Logically deleted repos must stop being scheduled.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl From<&Repo> for ConfiguredRepo {
    fn from(r: &Repo) -> Self {
        Self {
            id: r.id,
            name: r.name.clone(),
            url: r.clone_urls.first().cloned().unwrap_or_default(),
            enabled: r.enabled,
        }
    }
}
