//! Configuration for repo-updater.
//!
//! Loaded from `./repo-updater.yml` or `~/.config/repo-updater/repo-updater.yml`,
//! and re-read periodically by [`ConfigWatcher`].

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{ConfiguredRepo, SourceRepoMap};
use crate::error::{Result, UpdaterError};
use crate::scheduler::SchedulerSettings;
use crate::updater::HttpUpdaterConfig;

pub use self::watch::ConfigWatcher;

mod watch;

/// File name searched for in the working and user config directories.
pub const CONFIG_FILE_NAME: &str = "repo-updater.yml";

/// Default base URL of the update service.
pub const DEFAULT_UPDATE_ENDPOINT: &str = "http://127.0.0.1:3178";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UpdaterConfig {
    /// Stop the periodic schedule; manual updates still run.
    pub disable_auto_git_updates: bool,

    /// Maximum concurrent update requests. Zero means the default of 5.
    pub git_max_concurrent_clones: usize,

    /// Base URL of the update service.
    pub update_endpoint: String,

    /// Per-request timeout against the update service.
    pub update_timeout_secs: u64,

    /// How often the config file is re-read.
    pub reload_interval_secs: u64,

    pub debug_dump: DebugDumpConfig,

    /// Repos per configuration source.
    pub sources: BTreeMap<String, Vec<ConfiguredRepo>>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            disable_auto_git_updates: false,
            git_max_concurrent_clones: 0,
            update_endpoint: DEFAULT_UPDATE_ENDPOINT.to_string(),
            update_timeout_secs: 60,
            reload_interval_secs: 10,
            debug_dump: DebugDumpConfig::default(),
            sources: BTreeMap::new(),
        }
    }
}

/// Where and how often the daemon writes its debug dump.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DebugDumpConfig {
    /// Dump file; defaults to the data directory when unset.
    pub path: Option<PathBuf>,
    pub interval_secs: u64,
}

impl Default for DebugDumpConfig {
    fn default() -> Self {
        Self {
            path: None,
            interval_secs: 30,
        }
    }
}

impl DebugDumpConfig {
    /// Configured dump path, or `<data_local_dir>/repo-updater/debug-dump.json`.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("repo-updater")
                .join("debug-dump.json")
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl UpdaterConfig {
    /// Find the config file to use.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. ./repo-updater.yml
    /// 3. ~/.config/repo-updater/repo-updater.yml
    pub fn resolve_path(explicit: Option<&PathBuf>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.clone());
        }

        let project_config = PathBuf::from(CONFIG_FILE_NAME);
        if project_config.exists() {
            return Some(project_config);
        }

        let user_config = dirs::config_dir()?.join("repo-updater").join(CONFIG_FILE_NAME);
        user_config.exists().then_some(user_config)
    }

    /// Load configuration with fallback chain, ending in defaults.
    ///
    /// An explicit path must load; discovered files that fail to parse are
    /// skipped with a warning.
    pub fn load(explicit: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        match Self::resolve_path(None) {
            Some(path) => match Self::load_from_file(&path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Ok(config)
                }
                Err(e) => {
                    log::warn!("Failed to load {}: {}", path.display(), e);
                    Ok(Self::default())
                }
            },
            None => {
                log::info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.reload_interval_secs == 0 {
            return Err(UpdaterError::Config("reload-interval-secs must be > 0".to_string()));
        }
        if self.update_timeout_secs == 0 {
            return Err(UpdaterError::Config("update-timeout-secs must be > 0".to_string()));
        }

        for (source, repos) in &self.sources {
            let mut names = HashSet::new();
            for repo in repos {
                if repo.id == 0 {
                    return Err(UpdaterError::Config(format!(
                        "source {}: repo {} has id 0",
                        source, repo.name
                    )));
                }
                if !names.insert(repo.name.as_str()) {
                    return Err(UpdaterError::Config(format!(
                        "source {}: duplicate repo name {}",
                        source, repo.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// The settings the scheduler loops react to.
    pub fn settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            disable_auto_git_updates: self.disable_auto_git_updates,
            git_max_concurrent_clones: self.git_max_concurrent_clones,
        }
    }

    pub fn updater_config(&self) -> HttpUpdaterConfig {
        HttpUpdaterConfig {
            endpoint: self.update_endpoint.clone(),
            timeout: Duration::from_secs(self.update_timeout_secs),
        }
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }

    /// Each configured source as a name-keyed map.
    pub fn source_maps(&self) -> BTreeMap<String, SourceRepoMap> {
        self.sources
            .iter()
            .map(|(source, repos)| {
                let map = repos.iter().map(|r| (r.name.clone(), r.clone())).collect();
                (source.clone(), map)
            })
            .collect()
    }
}
