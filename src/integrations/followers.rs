//! Follower-listing API adapter
//!
//! HTTP implementation of [`PageFetcher`] for the Neynar and Farcaster
//! follower endpoints.

use super::{effective_limit, FollowerPage, PageFetcher};
use crate::ids::{FollowerId, SyncCursor, TargetId};
use crate::{FollowSyncError, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Per-request timeout for a follower page
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which upstream API serves the follower list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamSource {
    /// Neynar hub API, authenticated with an `x-api-key` header
    #[default]
    Neynar,
    /// Farcaster client API, authenticated with a bearer token
    Farcaster,
}

impl UpstreamSource {
    pub fn default_base_url(self) -> &'static str {
        match self {
            UpstreamSource::Neynar => "https://api.neynar.com/v2",
            UpstreamSource::Farcaster => "https://client.farcaster.xyz",
        }
    }

    fn followers_path(self) -> &'static str {
        match self {
            UpstreamSource::Neynar => "/farcaster/followers",
            UpstreamSource::Farcaster => "/v2/followers",
        }
    }

    /// Environment variable holding this source's credential
    pub fn credential_env(self) -> &'static str {
        match self {
            UpstreamSource::Neynar => "NEYNAR_API_KEY",
            UpstreamSource::Farcaster => "FARCASTER_BEARER_TOKEN",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamSource::Neynar => "neynar",
            UpstreamSource::Farcaster => "farcaster",
        }
    }
}

impl fmt::Display for UpstreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpstreamSource {
    type Err = FollowSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "neynar" => Ok(UpstreamSource::Neynar),
            "farcaster" => Ok(UpstreamSource::Farcaster),
            other => Err(FollowSyncError::Config(format!(
                "Unknown upstream source: {} (expected neynar or farcaster)",
                other
            ))),
        }
    }
}

/// Connection settings for [`HttpPageFetcher`]
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub source: UpstreamSource,

    /// Override for the source's default base URL
    pub base_url: Option<String>,

    /// API key or bearer token, depending on the source
    pub credential: String,

    pub request_timeout: Duration,
}

impl UpstreamConfig {
    pub fn new(source: UpstreamSource, credential: impl Into<String>) -> Self {
        Self {
            source,
            base_url: None,
            credential: credential.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Page envelope shared by both upstream sources
#[derive(Debug, Clone, Deserialize)]
struct FollowersEnvelope {
    result: FollowersResult,
    #[serde(default)]
    next: Option<NextCursor>,
}

#[derive(Debug, Clone, Deserialize)]
struct FollowersResult {
    users: Vec<FollowerUser>,
}

#[derive(Debug, Clone, Deserialize)]
struct FollowerUser {
    fid: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct NextCursor {
    #[serde(default)]
    cursor: Option<String>,
}

/// Decode a raw response body into a [`FollowerPage`]
pub fn decode_page(body: &str) -> Result<FollowerPage> {
    let envelope: FollowersEnvelope = serde_json::from_str(body)
        .map_err(|e| FollowSyncError::Decode(format!("Unexpected follower page payload: {}", e)))?;

    let follower_ids = envelope
        .result
        .users
        .into_iter()
        .map(|user| FollowerId::new(user.fid))
        .collect();
    let next_cursor = envelope
        .next
        .and_then(|next| next.cursor)
        .and_then(SyncCursor::from_raw);

    Ok(FollowerPage {
        follower_ids,
        next_cursor,
    })
}

/// HTTP follower-page client
pub struct HttpPageFetcher {
    client: Client,
    source: UpstreamSource,
    followers_url: String,
    credential: String,
    request_timeout: Duration,
}

impl HttpPageFetcher {
    /// Create a new fetcher
    ///
    /// Returns an error if the credential is empty or the HTTP client cannot be created.
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        if config.credential.trim().is_empty() {
            return Err(FollowSyncError::Config(format!(
                "{} credential is empty (set {})",
                config.source,
                config.source.credential_env()
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::USER_AGENT,
                    header::HeaderValue::from_static("followsync/0.1"),
                );
                headers.insert(
                    header::ACCEPT,
                    header::HeaderValue::from_static("application/json"),
                );
                headers
            })
            .build()
            .map_err(|e| FollowSyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(config.source.default_base_url())
            .trim_end_matches('/');
        let followers_url = format!("{}{}", base_url, config.source.followers_path());

        Ok(Self {
            client,
            source: config.source,
            followers_url,
            credential: config.credential,
            request_timeout: config.request_timeout,
        })
    }

    pub fn source(&self) -> UpstreamSource {
        self.source
    }

    pub fn followers_url(&self) -> &str {
        &self.followers_url
    }

    fn query_params(
        target: &TargetId,
        limit: u32,
        cursor: Option<&SyncCursor>,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("fid", target.as_str().to_string()),
            ("limit", effective_limit(limit).to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.as_str().to_string()));
        }
        params
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(
        &self,
        target: &TargetId,
        limit: u32,
        cursor: Option<&SyncCursor>,
    ) -> Result<FollowerPage> {
        debug!(
            source = %self.source,
            target = %target,
            cursor_len = cursor.map_or(0, |c| c.len()),
            "Fetching follower page"
        );

        let mut request = self
            .client
            .get(&self.followers_url)
            .query(&Self::query_params(target, limit, cursor));
        request = match self.source {
            UpstreamSource::Neynar => request.header("x-api-key", &self.credential),
            UpstreamSource::Farcaster => request.bearer_auth(&self.credential),
        };

        let response = request
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| FollowSyncError::Transport(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            FollowSyncError::Transport(format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            return Err(FollowSyncError::upstream(status.as_u16(), &body));
        }

        decode_page(&body)
    }
}
