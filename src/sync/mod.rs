//! Follower synchronization
//!
//! A sweep pages through a target's follower list from the first page until
//! the upstream stops returning a cursor, merging each page into the
//! membership cache as it arrives.
//!
//! # Strategies
//!
//! - **Incremental** (default): never clears. An interrupted sweep loses
//!   nothing that was cached before it, and per-page new-counts expose graph
//!   growth cheaply.
//! - **Destructive**: clears the set first so unfollows disappear, at the
//!   cost of a window where the set is partially populated.
//!
//! # Failure handling
//!
//! Fetch and merge errors are not retried. The sweep stops at the failing
//! page, pages already merged stay cached and the last sync time is left
//! where it was. The next scheduled run starts again from the first page.

mod orchestrator;
mod stats;

pub use orchestrator::{SyncOptions, SyncOrchestrator, DEFAULT_PAGE_DELAY, DEFAULT_SWEEP_TIMEOUT};
pub use stats::{SyncRunStats, SyncStrategy};
