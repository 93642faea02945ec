//! Membership cache
//!
//! Set-per-target storage of follower ids plus a per-target "last sync"
//! timestamp. The orchestrator writes through [`MembershipStore`]; the query
//! path reads through the same handle.
//!
//! # Implementations
//!
//! - [`SqliteMembershipStore`]: persistent SQLite storage (WAL mode)
//! - [`InMemoryMembershipStore`]: process-local storage for tests and
//!   single-process deployments
//!
//! Every operation is individually atomic. No isolation is provided across
//! calls, so a reader may observe a set halfway through a sweep.

mod memory;
mod sqlite;

pub use memory::InMemoryMembershipStore;
pub use sqlite::{default_db_path, SqliteMembershipStore, SqliteStoreConfig};

use crate::ids::{FollowerId, TargetId};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Default namespace for store keys
pub const DEFAULT_KEY_PREFIX: &str = "farcaster";

/// The zero time returned for a target that has never completed a sweep
pub fn never_synced() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Interface for the follower membership cache.
///
/// All operations are keyed by [`TargetId`]. An unknown target behaves like
/// an empty set: `contains` is `false`, `count` is `0` and
/// `get_last_sync_time` is [`never_synced`].
///
/// Any operation may fail with `StorageUnavailable`. A failed batch add must
/// be treated as having recorded nothing, even though a backend without
/// atomic multi-row writes may have persisted a subset.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Insert all ids, ignoring ones already present.
    async fn add_batch(&self, target: &TargetId, ids: &[FollowerId]) -> Result<()> {
        self.add_batch_count_new(target, ids).await.map(|_| ())
    }

    /// Insert all ids and report how many were not previously present.
    async fn add_batch_count_new(&self, target: &TargetId, ids: &[FollowerId]) -> Result<u64>;

    /// Membership test.
    async fn contains(&self, target: &TargetId, id: FollowerId) -> Result<bool>;

    /// Current cardinality of the target's set.
    async fn count(&self, target: &TargetId) -> Result<u64>;

    /// Remove the whole set for the target.
    async fn clear(&self, target: &TargetId) -> Result<()>;

    /// Record the completion time of the latest sweep.
    async fn set_last_sync_time(&self, target: &TargetId, at: DateTime<Utc>) -> Result<()>;

    /// Completion time of the latest sweep, or [`never_synced`].
    async fn get_last_sync_time(&self, target: &TargetId) -> Result<DateTime<Utc>>;
}

/// Namespaced key builder shared by store backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Key of the follower set for a target, e.g. `farcaster:followers:3`
    pub fn followers_key(&self, target: &TargetId) -> String {
        format!("{}:followers:{}", self.prefix, target)
    }

    /// Key of the last-sync scalar for a target, e.g. `farcaster:sync:last:3`
    pub fn last_sync_key(&self, target: &TargetId) -> String {
        format!("{}:sync:last:{}", self.prefix, target)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}
