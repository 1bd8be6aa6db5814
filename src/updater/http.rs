//! HTTP client for the repository update service

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::client::{RepoUpdateResponse, RepoUpdater};
use crate::domain::ConfiguredRepo;
use crate::error::{Result, UpdaterError};

/// Path of the update endpoint relative to the service base URL
const REPO_UPDATE_PATH: &str = "repo-update";

/// Configuration for the HTTP updater
#[derive(Debug, Clone)]
pub struct HttpUpdaterConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for HttpUpdaterConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3178".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct RepoUpdateRequest<'a> {
    repo: &'a str,
    url: &'a str,
    since_secs: u64,
}

/// Sends update requests to the update service over HTTP
#[derive(Debug, Clone)]
pub struct HttpRepoUpdater {
    client: Client,
    url: String,
}

impl HttpRepoUpdater {
    pub fn new(config: HttpUpdaterConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: repo_update_url(&config.endpoint),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn repo_update_url(endpoint: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), REPO_UPDATE_PATH)
}

#[async_trait]
impl RepoUpdater for HttpRepoUpdater {
    async fn request_repo_update(&self, repo: &ConfiguredRepo, since: Duration) -> Result<RepoUpdateResponse> {
        let body = RepoUpdateRequest {
            repo: &repo.name,
            url: &repo.url,
            since_secs: since.as_secs(),
        };

        let response = self.client.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UpdaterError::Remote(format!("update service returned {}: {}", status, error_body)));
        }

        let update: RepoUpdateResponse = response.json().await?;
        debug!(repo = %repo.name, ?update, "repo update response");

        match update.error {
            Some(ref message) if !message.is_empty() => Err(UpdaterError::Remote(message.clone())),
            _ => Ok(update),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = HttpUpdaterConfig::default();
        assert_eq!(config.endpoint, "http://127.0.0.1:3178");
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_repo_update_url_trims_trailing_slash() {
        assert_eq!(repo_update_url("http://host:1/"), "http://host:1/repo-update");
        assert_eq!(repo_update_url("http://host:1"), "http://host:1/repo-update");
    }

    #[test]
    fn test_request_body_shape() {
        let body = RepoUpdateRequest {
            repo: "github.com/acme/widgets",
            url: "https://github.com/acme/widgets",
            since_secs: 1,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["repo"], "github.com/acme/widgets");
        assert_eq!(json["since_secs"], 1);
    }

    /// Serve a single canned HTTP response and hand back the request body.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                let Some(split) = text.find("\r\n\r\n") else {
                    continue;
                };
                let length = text[..split]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= split + 4 + length {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let text = String::from_utf8_lossy(&request).to_string();
            text.split("\r\n\r\n").nth(1).unwrap_or_default().to_string()
        });

        (endpoint, handle)
    }

    fn updater(endpoint: String) -> HttpRepoUpdater {
        HttpRepoUpdater::new(HttpUpdaterConfig {
            endpoint,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn repo() -> ConfiguredRepo {
        ConfiguredRepo::new(1, "github.com/acme/widgets", "https://github.com/acme/widgets")
    }

    #[tokio::test]
    async fn test_request_repo_update_success() {
        let (endpoint, server) = serve_once(
            "200 OK",
            r#"{"last_fetched":"2024-01-01T10:00:00Z","last_changed":"2024-01-01T00:00:00Z"}"#,
        )
        .await;

        let response = updater(endpoint)
            .request_repo_update(&repo(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(response.suggested_interval(), Some(chrono::Duration::hours(5)));
        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["repo"], "github.com/acme/widgets");
        assert_eq!(sent["url"], "https://github.com/acme/widgets");
        assert_eq!(sent["since_secs"], 1);
    }

    #[tokio::test]
    async fn test_request_repo_update_error_field() {
        let (endpoint, _server) = serve_once("200 OK", r#"{"error":"repo not found"}"#).await;

        let result = updater(endpoint).request_repo_update(&repo(), Duration::from_secs(1)).await;

        assert!(matches!(result, Err(UpdaterError::Remote(ref m)) if m == "repo not found"));
    }

    #[tokio::test]
    async fn test_request_repo_update_bad_status() {
        let (endpoint, _server) = serve_once("503 Service Unavailable", "{}").await;

        let result = updater(endpoint).request_repo_update(&repo(), Duration::from_secs(1)).await;

        match result {
            Err(UpdaterError::Remote(message)) => assert!(message.contains("503")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_new_builds_url() {
        let updater = HttpRepoUpdater::new(HttpUpdaterConfig {
            endpoint: "http://updater.internal".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(updater.url(), "http://updater.internal/repo-update");
    }
}
