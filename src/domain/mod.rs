//! Domain types for repo-updater
//!
//! This module contains the repository identities the scheduler works with:
//! - Repo: the upstream record as delivered by a repository syncer
//! - ConfiguredRepo: the scheduler's immutable view of a repository
//! - SourceRepoMap: the last known repositories of one configuration source

pub mod repo;

pub use repo::{ConfiguredRepo, Repo, RepoId, SourceRepoMap};
