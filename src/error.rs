//! Error types for followsync
//!
//! Defines the error enum covering every failure mode of a sweep, the
//! membership store and the query path. Uses thiserror for ergonomic error
//! handling.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for followsync operations
pub type Result<T> = std::result::Result<T, FollowSyncError>;

/// Maximum number of response body characters kept for diagnostics
pub const MAX_ERROR_BODY_CHARS: usize = 2000;

/// Comprehensive error type for followsync operations
#[derive(Error, Debug)]
pub enum FollowSyncError {
    /// Network-level failure talking to the upstream API (connect, timeout, body read)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-success status
    #[error("Upstream error: HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Upstream payload did not match the expected page envelope
    #[error("Decode error: {0}")]
    Decode(String),

    /// Membership store backend could not be reached or failed
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Sweep exceeded its overall deadline
    #[error("Sweep for target {target} timed out after {elapsed:?}")]
    SweepTimeout { target: String, elapsed: Duration },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A follower id could not be parsed
    #[error("Invalid follower id: {0}")]
    InvalidFollowerId(String),

    /// Social network / action pair is not served from the cache
    #[error("Unsupported social or action: {social}/{action}")]
    Unsupported { social: String, action: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl FollowSyncError {
    /// Build an upstream error, truncating the body for diagnostics
    pub fn upstream(status: u16, body: &str) -> Self {
        FollowSyncError::Upstream {
            status,
            body: truncate_body(body),
        }
    }

    /// Short static label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            FollowSyncError::Transport(_) => "transport",
            FollowSyncError::Upstream { .. } => "upstream",
            FollowSyncError::Decode(_) => "decode",
            FollowSyncError::StorageUnavailable(_) => "storage_unavailable",
            FollowSyncError::SweepTimeout { .. } => "sweep_timeout",
            FollowSyncError::Config(_) => "config",
            FollowSyncError::InvalidFollowerId(_) => "invalid_follower_id",
            FollowSyncError::Unsupported { .. } => "unsupported",
            FollowSyncError::Io(_) => "io",
            FollowSyncError::Json(_) => "json",
            FollowSyncError::Yaml(_) => "yaml",
            FollowSyncError::Other(_) => "other",
        }
    }

    /// Whether this error came from the page fetcher
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            FollowSyncError::Transport(_)
                | FollowSyncError::Upstream { .. }
                | FollowSyncError::Decode(_)
        )
    }
}

impl From<rusqlite::Error> for FollowSyncError {
    fn from(e: rusqlite::Error) -> Self {
        FollowSyncError::StorageUnavailable(e.to_string())
    }
}

impl From<reqwest::Error> for FollowSyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FollowSyncError::Decode(e.to_string())
        } else {
            FollowSyncError::Transport(e.to_string())
        }
    }
}

/// Truncate a response body to [`MAX_ERROR_BODY_CHARS`] characters
fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    truncated.push_str("...(truncated)");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_body_truncated() {
        let body = "x".repeat(5000);
        match FollowSyncError::upstream(429, &body) {
            FollowSyncError::Upstream { status, body } => {
                assert_eq!(status, 429);
                assert!(body.ends_with("...(truncated)"));
                assert_eq!(body.len(), MAX_ERROR_BODY_CHARS + "...(truncated)".len());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_short_body_kept() {
        let err = FollowSyncError::upstream(401, "unauthorized");
        assert_eq!(err.to_string(), "Upstream error: HTTP 401: unauthorized");
    }

    #[test]
    fn test_kind_and_fetch_classification() {
        assert_eq!(FollowSyncError::Transport("x".into()).kind(), "transport");
        assert!(FollowSyncError::Decode("x".into()).is_fetch_error());
        assert!(!FollowSyncError::StorageUnavailable("x".into()).is_fetch_error());
        assert!(FollowSyncError::upstream(500, "").is_fetch_error());
    }
}
