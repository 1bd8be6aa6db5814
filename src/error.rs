//! Error types for repo-updater
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in repo-updater
#[derive(Debug, Error)]
pub enum UpdaterError {
    /// Invalid or inconsistent configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Transport failure talking to the update service
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The update service answered but reported a failure
    #[error("Remote error: {0}")]
    Remote(String),

    /// The surrounding context was cancelled
    #[error("Cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for repo-updater operations
pub type Result<T> = std::result::Result<T, UpdaterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = UpdaterError::Config("repo id must be non-zero".to_string());
        assert_eq!(err.to_string(), "Config error: repo id must be non-zero");
    }

    #[test]
    fn test_remote_error() {
        let err = UpdaterError::Remote("clone in progress".to_string());
        assert_eq!(err.to_string(), "Remote error: clone in progress");
    }

    #[test]
    fn test_cancelled_error() {
        assert_eq!(UpdaterError::Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: UpdaterError = io_err.into();
        assert!(matches!(err, UpdaterError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: UpdaterError = json_err.into();
        assert!(matches!(err, UpdaterError::Json(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<Vec<u32>>("{not: [a list").unwrap_err();
        let err: UpdaterError = yaml_err.into();
        assert!(matches!(err, UpdaterError::Yaml(_)));
    }
}
