//! Sweep orchestration
//!
//! Drives a full pagination traversal of one target's follower list and
//! merges every page into the membership store.

use super::{SyncRunStats, SyncStrategy};
use crate::cache::MembershipStore;
use crate::ids::{SyncCursor, TargetId};
use crate::integrations::{PageFetcher, DEFAULT_PAGE_SIZE};
use crate::metrics;
use crate::{FollowSyncError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

/// Delay between successive page requests
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(500);

/// Overall deadline for one sweep
pub const DEFAULT_SWEEP_TIMEOUT: Duration = Duration::from_secs(240);

/// Number of ids shown in per-page log lines
const PREVIEW_LEN: usize = 5;

/// Sweep tuning
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Followers requested per page
    pub page_size: u32,

    /// Pause between page requests to respect upstream rate limits
    pub page_delay: Duration,

    /// Deadline for the whole pagination loop
    pub sweep_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: DEFAULT_PAGE_DELAY,
            sweep_timeout: DEFAULT_SWEEP_TIMEOUT,
        }
    }
}

impl SyncOptions {
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_sweep_timeout(mut self, timeout: Duration) -> Self {
        self.sweep_timeout = timeout;
        self
    }
}

/// Sweep driver
///
/// Owns handles to the page fetcher and the membership store. Sweeps of the
/// same target are serialized; sweeps of different targets are independent.
pub struct SyncOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn MembershipStore>,
    options: SyncOptions,
    sweep_locks: std::sync::Mutex<HashMap<TargetId, Arc<AsyncMutex<()>>>>,
}

impl SyncOrchestrator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn MembershipStore>,
        options: SyncOptions,
    ) -> Self {
        Self {
            fetcher,
            store,
            options,
            sweep_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn MembershipStore> {
        Arc::clone(&self.store)
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Incremental sweep: keep cached followers, count growth
    pub async fn sync_incremental(&self, target: &TargetId) -> Result<SyncRunStats> {
        self.sweep(target, SyncStrategy::Incremental).await
    }

    /// Destructive sweep: clear, then repopulate
    pub async fn sync_destructive(&self, target: &TargetId) -> Result<SyncRunStats> {
        self.sweep(target, SyncStrategy::Destructive).await
    }

    /// Run one full sweep for `target`.
    ///
    /// On success the last sync time is advanced. Any fetch or merge error,
    /// or the sweep deadline elapsing, aborts the sweep and leaves the last
    /// sync time untouched; pages merged before the failure stay cached.
    pub async fn sweep(&self, target: &TargetId, strategy: SyncStrategy) -> Result<SyncRunStats> {
        let lock = self.sweep_lock(target)?;
        let _guard = lock.lock().await;

        info!(target = %target, strategy = %strategy, "Starting sweep");
        let start = Instant::now();

        let outcome =
            match tokio::time::timeout(self.options.sweep_timeout, self.paginate(target, strategy))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(FollowSyncError::SweepTimeout {
                    target: target.to_string(),
                    elapsed: start.elapsed(),
                }),
            };

        match outcome {
            Ok(mut stats) => {
                stats.elapsed = start.elapsed();
                self.finish(&mut stats).await;
                Ok(stats)
            }
            Err(e) => {
                metrics::record_sweep_error(target.as_str(), e.kind());
                error!(
                    target = %target,
                    strategy = %strategy,
                    kind = e.kind(),
                    error = %e,
                    "Sweep aborted"
                );
                Err(e)
            }
        }
    }

    fn sweep_lock(&self, target: &TargetId) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .sweep_locks
            .lock()
            .map_err(|_| FollowSyncError::Other("Sweep lock table poisoned".to_string()))?;
        Ok(Arc::clone(locks.entry(target.clone()).or_default()))
    }

    async fn paginate(&self, target: &TargetId, strategy: SyncStrategy) -> Result<SyncRunStats> {
        let mut stats = SyncRunStats::new(target.clone(), strategy);

        stats.previous_count = match self.store.count(target).await {
            Ok(count) => count,
            Err(e) => {
                warn!(target = %target, error = %e, "Could not read existing cache count");
                0
            }
        };
        debug!(target = %target, cached = stats.previous_count, "Existing cached followers");

        if strategy == SyncStrategy::Destructive {
            if let Err(e) = self.store.clear(target).await {
                warn!(target = %target, error = %e, "Failed to clear existing followers");
            }
        }

        let mut cursor: Option<SyncCursor> = None;
        loop {
            let page_number = stats.pages + 1;
            debug!(
                target = %target,
                page = page_number,
                cursor_len = cursor.as_ref().map_or(0, |c| c.len()),
                "Fetching page"
            );

            let page = self
                .fetcher
                .fetch_page(target, self.options.page_size, cursor.as_ref())
                .await?;
            stats.pages = page_number;

            if page.follower_ids.is_empty() {
                debug!(target = %target, page = page_number, "No users on page");
            } else {
                let fetched = page.follower_ids.len();
                let added = match strategy {
                    SyncStrategy::Destructive => {
                        self.store.add_batch(target, &page.follower_ids).await?;
                        0
                    }
                    SyncStrategy::Incremental => {
                        self.store
                            .add_batch_count_new(target, &page.follower_ids)
                            .await?
                    }
                };

                stats.fetched += fetched as u64;
                stats.newly_added += added;
                metrics::record_page(target.as_str(), fetched, added);

                let preview: Vec<i64> = page
                    .follower_ids
                    .iter()
                    .take(PREVIEW_LEN)
                    .map(|id| id.get())
                    .collect();
                info!(
                    target = %target,
                    page = page_number,
                    fetched,
                    new_added = added,
                    ?preview,
                    "Page merged"
                );
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    debug!(target = %target, page = page_number, "No more cursor, pagination finished");
                    break;
                }
            }

            if !self.options.page_delay.is_zero() {
                tokio::time::sleep(self.options.page_delay).await;
            }
        }

        Ok(stats)
    }

    /// Advance the last sync time and record the summary. Failures here are advisory.
    async fn finish(&self, stats: &mut SyncRunStats) {
        let target = stats.target.clone();
        let now = Utc::now();

        match self.store.set_last_sync_time(&target, now).await {
            Ok(()) => stats.completed_at = Some(now),
            Err(e) => warn!(target = %target, error = %e, "Failed to set last sync time"),
        }

        match self.store.count(&target).await {
            Ok(count) => {
                stats.final_count = count;
                metrics::set_cached_followers(target.as_str(), count);
            }
            Err(e) => warn!(target = %target, error = %e, "Could not read final cache count"),
        }

        metrics::record_sweep_duration(
            target.as_str(),
            stats.strategy.as_str(),
            stats.elapsed.as_secs_f64(),
        );

        info!(
            target = %target,
            strategy = %stats.strategy,
            pages = stats.pages,
            api_fetched = stats.fetched,
            newly_added = stats.newly_added,
            total_cached_before = stats.previous_count,
            total_cached_now = stats.final_count,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Sweep complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryMembershipStore;
    use crate::ids::FollowerId;
    use crate::integrations::FollowerPage;
    use async_trait::async_trait;

    /// Serves the same scripted pages to every target, keyed by incoming cursor
    struct ScriptedFetcher {
        pages: Vec<(Option<&'static str>, Vec<i64>, Option<&'static str>)>,
        calls: std::sync::Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch_page(
            &self,
            _target: &TargetId,
            _limit: u32,
            cursor: Option<&SyncCursor>,
        ) -> Result<FollowerPage> {
            let incoming = cursor.map(|c| c.as_str().to_string());
            self.calls.lock().unwrap().push(incoming.clone());
            let (_, ids, next) = self
                .pages
                .iter()
                .find(|(c, _, _)| c.map(str::to_string) == incoming)
                .ok_or_else(|| FollowSyncError::Transport("unknown cursor".into()))?;
            Ok(FollowerPage {
                follower_ids: ids.iter().copied().map(FollowerId::new).collect(),
                next_cursor: next.and_then(SyncCursor::from_raw),
            })
        }
    }

    fn orchestrator(fetcher: ScriptedFetcher) -> (SyncOrchestrator, Arc<InMemoryMembershipStore>) {
        let store = Arc::new(InMemoryMembershipStore::new());
        let options = SyncOptions::default().with_page_delay(Duration::ZERO);
        (
            SyncOrchestrator::new(Arc::new(fetcher), store.clone(), options),
            store,
        )
    }

    #[tokio::test]
    async fn test_follows_cursor_chain() {
        let fetcher = ScriptedFetcher {
            pages: vec![
                (None, vec![1, 2], Some("c1")),
                (Some("c1"), vec![3], Some("c2")),
                (Some("c2"), vec![], None),
            ],
            calls: Default::default(),
        };
        let (orch, store) = orchestrator(fetcher);
        let target = TargetId::new("3");

        let stats = orch.sync_incremental(&target).await.unwrap();
        assert_eq!(stats.pages, 3);
        assert_eq!(stats.fetched, 3);
        assert_eq!(stats.newly_added, 3);
        assert_eq!(stats.final_count, 3);
        assert!(stats.completed_at.is_some());
        assert_eq!(store.count(&target).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_sweep_timeout() {
        struct Hung;

        #[async_trait]
        impl PageFetcher for Hung {
            async fn fetch_page(
                &self,
                _target: &TargetId,
                _limit: u32,
                _cursor: Option<&SyncCursor>,
            ) -> Result<FollowerPage> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(FollowerPage::default())
            }
        }

        let store = Arc::new(InMemoryMembershipStore::new());
        let options = SyncOptions::default().with_sweep_timeout(Duration::from_millis(50));
        let orch = SyncOrchestrator::new(Arc::new(Hung), store.clone(), options);
        let target = TargetId::new("3");

        let err = orch.sync_incremental(&target).await.unwrap_err();
        assert!(matches!(err, FollowSyncError::SweepTimeout { .. }));
        assert_eq!(
            store.get_last_sync_time(&target).await.unwrap(),
            crate::cache::never_synced()
        );
    }

    #[test]
    fn test_options_builder() {
        let options = SyncOptions::default()
            .with_page_size(15)
            .with_page_delay(Duration::from_millis(10))
            .with_sweep_timeout(Duration::from_secs(5));
        assert_eq!(options.page_size, 15);
        assert_eq!(options.page_delay, Duration::from_millis(10));
        assert_eq!(options.sweep_timeout, Duration::from_secs(5));
    }
}
