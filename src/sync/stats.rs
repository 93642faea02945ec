//! Sweep strategies and per-sweep counters

use crate::ids::TargetId;
use crate::FollowSyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How a sweep merges upstream pages into the cached set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    /// Clear the cached set, then repopulate it from the first page
    Destructive,
    /// Keep the cached set and add whatever the sweep finds
    #[default]
    Incremental,
}

impl SyncStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStrategy::Destructive => "destructive",
            SyncStrategy::Incremental => "incremental",
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStrategy {
    type Err = FollowSyncError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "destructive" | "full" => Ok(SyncStrategy::Destructive),
            "incremental" => Ok(SyncStrategy::Incremental),
            other => Err(FollowSyncError::Config(format!(
                "Unknown sync strategy: {} (expected incremental or destructive)",
                other
            ))),
        }
    }
}

/// Counters for one sweep
///
/// Ephemeral: only logged, exported as metrics and returned to the caller.
#[derive(Debug, Clone)]
pub struct SyncRunStats {
    pub target: TargetId,

    pub strategy: SyncStrategy,

    /// Pages fetched from upstream
    pub pages: u32,

    /// Follower ids received across all pages (overlap included)
    pub fetched: u64,

    /// Ids that were not cached before this sweep. Always 0 for destructive sweeps.
    pub newly_added: u64,

    /// Cardinality before the sweep started
    pub previous_count: u64,

    /// Cardinality after the sweep finished
    pub final_count: u64,

    pub elapsed: Duration,

    /// Timestamp recorded as last sync time, if the store accepted it
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncRunStats {
    pub fn new(target: TargetId, strategy: SyncStrategy) -> Self {
        Self {
            target,
            strategy,
            pages: 0,
            fetched: 0,
            newly_added: 0,
            previous_count: 0,
            final_count: 0,
            elapsed: Duration::ZERO,
            completed_at: None,
        }
    }

    /// Net change in cardinality (negative after a shrinking destructive sweep)
    pub fn growth(&self) -> i64 {
        self.final_count as i64 - self.previous_count as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse() {
        assert_eq!("incremental".parse::<SyncStrategy>().unwrap(), SyncStrategy::Incremental);
        assert_eq!("Full".parse::<SyncStrategy>().unwrap(), SyncStrategy::Destructive);
        assert!("partial".parse::<SyncStrategy>().is_err());
        assert_eq!(SyncStrategy::default(), SyncStrategy::Incremental);
    }

    #[test]
    fn test_growth() {
        let mut stats = SyncRunStats::new(TargetId::new("3"), SyncStrategy::Destructive);
        stats.previous_count = 5;
        stats.final_count = 2;
        assert_eq!(stats.growth(), -3);
    }
}
