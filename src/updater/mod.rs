//! Update Client Layer - requests repository refreshes from the update service
//!
//! This module provides:
//! - RepoUpdater trait for transport abstraction
//! - HttpRepoUpdater implementation
//! - MockRepoUpdater for tests

pub mod client;
pub mod http;

pub use client::{MockRepoUpdater, RepoUpdateResponse, RepoUpdater};
pub use http::{HttpRepoUpdater, HttpUpdaterConfig};
