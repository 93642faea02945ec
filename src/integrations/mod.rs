//! Upstream integrations
//!
//! Adapters for the paginated follower-listing APIs the cache is built from.
//!
//! # Overview
//!
//! The orchestrator only depends on [`PageFetcher`]: one call, one page.
//! [`HttpPageFetcher`] is the production adapter and speaks to either the
//! Neynar API or the Farcaster client API, which share the same page
//! envelope:
//!
//! ```json
//! { "result": { "users": [ { "fid": 3 }, { "fid": 7 } ] },
//!   "next": { "cursor": "eyJ0aW1lc3RhbXAiOi..." } }
//! ```
//!
//! An absent, null or empty `next.cursor` marks the last page.

pub mod followers;

pub use followers::{decode_page, HttpPageFetcher, UpstreamConfig, UpstreamSource};

use crate::ids::{FollowerId, SyncCursor, TargetId};
use crate::Result;
use async_trait::async_trait;

/// Page size used when none is configured
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Resolve a configured page size, substituting the default for zero
pub fn effective_limit(limit: u32) -> u32 {
    if limit == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        limit
    }
}

/// One decoded page of followers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowerPage {
    /// Follower ids in the order the upstream delivered them
    pub follower_ids: Vec<FollowerId>,

    /// Continuation token; `None` iff this was the last page
    pub next_cursor: Option<SyncCursor>,
}

impl FollowerPage {
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Fetches a single page of a target's followers.
///
/// Implementations perform exactly one upstream call per invocation and
/// must not mutate shared state. Errors are `Transport`, `Upstream` or
/// `Decode`; all of them end the current sweep.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the page starting at `cursor` (`None` for the first page).
    async fn fetch_page(
        &self,
        target: &TargetId,
        limit: u32,
        cursor: Option<&SyncCursor>,
    ) -> Result<FollowerPage>;
}
