//! Debug dump persistence.

use std::fs;
use std::path::Path;

use eyre::{Context, Result};

use crate::scheduler::UpdateScheduler;

/// Write the scheduler's debug dump as pretty JSON.
///
/// Written to a sibling temp file and renamed so readers never see a
/// partial dump.
pub fn write_debug_dump(scheduler: &UpdateScheduler, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context(format!("Failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(&scheduler.debug_dump()).context("Failed to serialize debug dump")?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).context(format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).context(format!("Failed to move dump into {}", path.display()))?;
    Ok(())
}

/// Read the last dump written by a running daemon.
pub fn read_debug_dump(path: &Path) -> Result<serde_json::Value> {
    let content = fs::read_to_string(path).context(format!("Failed to read debug dump {}", path.display()))?;
    serde_json::from_str(&content).context("Failed to parse debug dump")
}
