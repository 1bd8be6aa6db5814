//! Core update client types and trait definitions

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ConfiguredRepo, RepoId};
use crate::error::{Result, UpdaterError};

/// Requests that the origin of a repository be fetched.
#[async_trait]
pub trait RepoUpdater: Send + Sync {
    /// Ask for an update of `repo` unless it was fetched less than `since` ago.
    async fn request_repo_update(&self, repo: &ConfiguredRepo, since: Duration) -> Result<RepoUpdateResponse>;
}

/// What the update service reports after handling a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoUpdateResponse {
    /// When the repository was last fetched from its origin
    #[serde(default)]
    pub last_fetched: Option<DateTime<Utc>>,

    /// When a fetch last changed the repository
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,

    /// Failure reported by the service, if any
    #[serde(default)]
    pub error: Option<String>,
}

impl RepoUpdateResponse {
    pub fn new(last_fetched: DateTime<Utc>, last_changed: DateTime<Utc>) -> Self {
        Self {
            last_fetched: Some(last_fetched),
            last_changed: Some(last_changed),
            error: None,
        }
    }

    /// The refresh interval suggested by this response: half of the time
    /// that passed between the last change and the last fetch.
    pub fn suggested_interval(&self) -> Option<chrono::Duration> {
        match (self.last_fetched, self.last_changed) {
            (Some(fetched), Some(changed)) => Some((fetched - changed) / 2),
            _ => None,
        }
    }
}

/// Scripted updater that records every request.
#[derive(Debug, Default)]
pub struct MockRepoUpdater {
    responses: Mutex<VecDeque<std::result::Result<RepoUpdateResponse, String>>>,
    fallback: RepoUpdateResponse,
    calls: Mutex<Vec<RepoId>>,
}

impl MockRepoUpdater {
    /// Every request is answered with `fallback` once scripted responses run out.
    pub fn new(fallback: RepoUpdateResponse) -> Self {
        Self {
            fallback,
            ..Default::default()
        }
    }

    pub fn push_response(&self, response: RepoUpdateResponse) {
        self.lock_responses().push_back(Ok(response));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.lock_responses().push_back(Err(message.into()));
    }

    /// IDs of all repos requested so far, in request order.
    pub fn calls(&self) -> Vec<RepoId> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<std::result::Result<RepoUpdateResponse, String>>> {
        self.responses.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RepoUpdater for MockRepoUpdater {
    async fn request_repo_update(&self, repo: &ConfiguredRepo, _since: Duration) -> Result<RepoUpdateResponse> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(repo.id);
        match self.lock_responses().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(UpdaterError::Remote(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggested_interval_is_half_the_gap() {
        let changed = Utc::now();
        let fetched = changed + chrono::Duration::hours(10);
        let response = RepoUpdateResponse::new(fetched, changed);
        assert_eq!(response.suggested_interval(), Some(chrono::Duration::hours(5)));
    }

    #[test]
    fn test_suggested_interval_needs_both_timestamps() {
        let response = RepoUpdateResponse {
            last_fetched: Some(Utc::now()),
            ..Default::default()
        };
        assert!(response.suggested_interval().is_none());
    }

    #[test]
    fn test_response_deserializes_with_missing_fields() {
        let response: RepoUpdateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response, RepoUpdateResponse::default());
    }

    #[tokio::test]
    async fn test_mock_updater_scripted_then_fallback() {
        let mock = MockRepoUpdater::new(RepoUpdateResponse::default());
        let changed = Utc::now();
        let scripted = RepoUpdateResponse::new(changed + chrono::Duration::hours(2), changed);
        mock.push_error("boom");
        mock.push_response(scripted.clone());

        let repo = ConfiguredRepo::new(4, "a", "https://example.com/a");
        let first = mock.request_repo_update(&repo, Duration::from_secs(1)).await;
        assert!(matches!(first, Err(UpdaterError::Remote(ref m)) if m == "boom"));

        let second = mock.request_repo_update(&repo, Duration::from_secs(1)).await.unwrap();
        assert_eq!(second, scripted);

        let third = mock.request_repo_update(&repo, Duration::from_secs(1)).await.unwrap();
        assert_eq!(third, RepoUpdateResponse::default());
        assert_eq!(mock.calls(), vec![4, 4, 4]);
    }
}
