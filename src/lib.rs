//! repo-updater - a self-adjusting repository update scheduler
//!
//! Repositories are refreshed on an interval derived from how recently they
//! last changed: half the time since the last change, clamped between 45
//! seconds and 8 hours. Due repos are queued and dispatched to an external
//! update service under a resizable concurrency limit.

pub mod clock;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod scheduler;
pub mod updater;

pub use error::{Result, UpdaterError};
