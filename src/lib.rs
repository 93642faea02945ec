//! followsync - Follower Synchronization & Membership Cache
//!
//! Keeps a local, queryable copy of "who follows whom" for a fixed set of
//! target accounts. A background scheduler periodically pages through each
//! target's follower list on an upstream social-graph API and merges the
//! results into a persistent membership cache; callers then answer "does F
//! follow T?" with a single set lookup instead of an upstream call.
//!
//! # Architecture
//!
//! - **integrations**: Page fetcher (Neynar / Farcaster follower APIs)
//! - **cache**: Membership store (SQLite, in-memory)
//! - **sync**: Sweep orchestration (incremental and destructive)
//! - **scheduler**: Recurring runs over all targets
//! - **query**: Cached membership lookups
//! - **config**: YAML configuration with environment overrides

// Core modules
pub mod config;
pub mod error;
pub mod ids;

// Components
pub mod cache;
pub mod integrations;
pub mod query;
pub mod scheduler;
pub mod sync;

// Observability
pub mod logging;
pub mod metrics;

// Re-exports
pub use error::{FollowSyncError, Result};
