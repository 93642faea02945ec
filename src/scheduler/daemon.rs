//! Scheduler daemon implementation
//!
//! Recurring sweep trigger. Runs as a tokio event loop: one run at start,
//! then one run per interval tick, until a shutdown command arrives.

use crate::ids::TargetId;
use crate::metrics;
use crate::sync::{SyncOrchestrator, SyncRunStats, SyncStrategy};
use crate::{FollowSyncError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Default interval between runs (5 minutes)
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Default deadline for one run over all targets (5 minutes)
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// Default event channel capacity
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Targets swept on every run, in order. Fixed for the scheduler's lifetime.
    pub targets: Vec<TargetId>,

    /// Interval between runs
    pub interval: Duration,

    /// Deadline for one run over all targets
    pub run_timeout: Duration,

    /// Strategy used for scheduled sweeps
    pub strategy: SyncStrategy,

    /// Event broadcast channel capacity
    pub event_channel_capacity: usize,

    /// File the metrics registry is exported to after every run
    pub metrics_file: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            interval: DEFAULT_SYNC_INTERVAL,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            strategy: SyncStrategy::Incremental,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            metrics_file: None,
        }
    }
}

impl SchedulerConfig {
    /// Create a config for the given targets; blank ids are dropped
    pub fn new<I, T>(targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetId>,
    {
        let targets = targets
            .into_iter()
            .map(Into::into)
            .filter(|t: &TargetId| !t.is_blank())
            .collect();
        Self {
            targets,
            ..Default::default()
        }
    }

    /// Set the interval between runs
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the run deadline
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Set the sweep strategy
    pub fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Export metrics to a text file after every run
    pub fn with_metrics_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.metrics_file = Some(path.into());
        self
    }
}

/// Events emitted by the scheduler
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// Event loop started
    Started {
        /// Targets bound at construction
        targets: Vec<TargetId>,
    },

    /// Event loop exited
    Stopped,

    /// A run over all targets began
    RunStarted { run: u64 },

    /// A target's sweep succeeded
    TargetSynced { run: u64, stats: SyncRunStats },

    /// A target's sweep failed; the run continues with the next target
    TargetFailed {
        run: u64,
        target: TargetId,
        message: String,
    },

    /// A run finished (possibly cut short by the run deadline)
    RunCompleted { summary: RunSummary },
}

/// Commands that can be sent to the scheduler
#[derive(Debug, Clone)]
pub enum SchedulerCommand {
    /// Trigger an immediate run
    SyncNow,

    /// Stop after the in-flight run, if any
    Shutdown,
}

/// Outcome of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Run sequence number, starting at 1
    pub run: u64,
    pub succeeded: usize,
    pub failed: usize,
    /// The run deadline elapsed before every target was swept
    pub timed_out: bool,
}

impl RunSummary {
    fn status(&self) -> &'static str {
        if self.timed_out {
            "timeout"
        } else if self.failed == 0 {
            "success"
        } else if self.succeeded == 0 {
            "failed"
        } else {
            "partial"
        }
    }
}

/// Recurring sweep scheduler
pub struct Scheduler {
    config: SchedulerConfig,
    orchestrator: Arc<SyncOrchestrator>,
    event_tx: broadcast::Sender<SchedulerEvent>,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: Option<mpsc::Receiver<SchedulerCommand>>,
    runs: u64,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, orchestrator: Arc<SyncOrchestrator>) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(10);

        Self {
            config,
            orchestrator,
            event_tx,
            command_tx,
            command_rx: Some(command_rx),
            runs: 0,
        }
    }

    /// Get an event subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Get a command sender
    pub fn command_sender(&self) -> mpsc::Sender<SchedulerCommand> {
        self.command_tx.clone()
    }

    pub fn targets(&self) -> &[TargetId] {
        &self.config.targets
    }

    /// Send an event, logging when nobody is listening
    fn send_event(&self, event: SchedulerEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("Scheduler event sent but no receivers subscribed");
        }
    }

    /// Sweep every configured target once, sequentially.
    ///
    /// A failing target is logged and skipped; it never prevents the
    /// remaining targets from being swept. The whole run is bounded by the
    /// run deadline.
    pub async fn run_once(&mut self) -> RunSummary {
        self.runs += 1;
        let run = self.runs;
        let mut summary = RunSummary {
            run,
            ..Default::default()
        };

        self.send_event(SchedulerEvent::RunStarted { run });
        info!(run, targets = self.config.targets.len(), "Scheduled run started");

        let deadline = Instant::now() + self.config.run_timeout;
        let targets = self.config.targets.clone();

        for target in targets {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                summary.timed_out = true;
                break;
            }

            let sweep = self.orchestrator.sweep(&target, self.config.strategy);
            match tokio::time::timeout(remaining, sweep).await {
                Ok(Ok(stats)) => {
                    summary.succeeded += 1;
                    self.send_event(SchedulerEvent::TargetSynced { run, stats });
                }
                Ok(Err(e)) => {
                    summary.failed += 1;
                    error!(run, target = %target, error = %e, "Error fetching followers");
                    self.send_event(SchedulerEvent::TargetFailed {
                        run,
                        target,
                        message: e.to_string(),
                    });
                }
                Err(_) => {
                    summary.failed += 1;
                    summary.timed_out = true;
                    warn!(run, target = %target, "Run deadline elapsed mid-sweep");
                    self.send_event(SchedulerEvent::TargetFailed {
                        run,
                        target,
                        message: format!(
                            "Run deadline of {:?} elapsed",
                            self.config.run_timeout
                        ),
                    });
                    break;
                }
            }
        }

        if summary.timed_out {
            warn!(run, "Scheduled run cut short by run deadline");
        }
        metrics::record_scheduler_run(summary.status());
        self.export_metrics();
        info!(
            run,
            succeeded = summary.succeeded,
            failed = summary.failed,
            status = summary.status(),
            "Scheduled run completed"
        );
        self.send_event(SchedulerEvent::RunCompleted {
            summary: summary.clone(),
        });

        summary
    }

    fn export_metrics(&self) {
        if let Some(ref path) = self.config.metrics_file {
            if let Err(e) = metrics::write_metrics_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to export metrics");
            }
        }
    }

    /// Run the event loop until a shutdown command arrives.
    ///
    /// The first interval tick fires immediately, which gives the startup
    /// run. Runs execute inline, so commands and ticks queue behind an
    /// in-flight run and a shutdown never interrupts one. Ticks missed while
    /// a run was active are skipped rather than replayed.
    pub async fn run(mut self) -> Result<()> {
        let mut command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| FollowSyncError::Config("Scheduler already running".to_string()))?;

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        metrics::set_health_status(true);
        info!(
            targets = ?self.config.targets.iter().map(TargetId::as_str).collect::<Vec<_>>(),
            interval_secs = self.config.interval.as_secs(),
            strategy = %self.config.strategy,
            "Scheduler started"
        );
        self.send_event(SchedulerEvent::Started {
            targets: self.config.targets.clone(),
        });

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_once().await;
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::SyncNow) => {
                            self.run_once().await;
                        }
                        Some(SchedulerCommand::Shutdown) | None => {
                            info!("Received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        metrics::set_health_status(false);
        self.export_metrics();
        info!(runs = self.runs, "Scheduler stopped");
        self.send_event(SchedulerEvent::Stopped);
        Ok(())
    }

    /// Spawn the event loop on the tokio runtime
    pub fn spawn(self) -> SchedulerHandle {
        let command_tx = self.command_sender();
        let event_tx = self.event_tx.clone();
        let join = tokio::spawn(self.run());
        SchedulerHandle {
            command_tx,
            event_tx,
            join,
        }
    }
}

/// Handle to a spawned scheduler
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    event_tx: broadcast::Sender<SchedulerEvent>,
    join: JoinHandle<Result<()>>,
}

impl SchedulerHandle {
    /// Get an event subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Request an immediate run
    pub async fn sync_now(&self) -> Result<()> {
        self.command_tx
            .send(SchedulerCommand::SyncNow)
            .await
            .map_err(|_| FollowSyncError::Other("Scheduler is not running".to_string()))
    }

    /// Whether the event loop has exited
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop future runs and wait for the event loop to exit.
    ///
    /// An in-flight run is allowed to finish (bounded by the run deadline).
    pub async fn stop(self) -> Result<()> {
        // The loop may already be gone; joining still reports its result.
        let _ = self.command_tx.send(SchedulerCommand::Shutdown).await;
        self.join
            .await
            .map_err(|e| FollowSyncError::Other(format!("Scheduler task failed: {}", e)))?
    }
}

/// Wait for SIGINT or SIGTERM
#[cfg(unix)]
pub async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
        FollowSyncError::Other(format!("Failed to set up SIGTERM handler: {}", e))
    })?;
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| {
        FollowSyncError::Other(format!("Failed to set up SIGINT handler: {}", e))
    })?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
    }
    Ok(())
}

/// Wait for Ctrl-C
#[cfg(not(unix))]
pub async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| FollowSyncError::Other(format!("Failed to listen for Ctrl-C: {}", e)))?;
    info!("Received Ctrl-C, initiating graceful shutdown");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryMembershipStore;
    use crate::ids::{FollowerId, SyncCursor};
    use crate::integrations::{FollowerPage, PageFetcher};
    use crate::sync::SyncOptions;
    use async_trait::async_trait;

    /// One page per target; targets named "bad" fail
    struct OnePage;

    #[async_trait]
    impl PageFetcher for OnePage {
        async fn fetch_page(
            &self,
            target: &TargetId,
            _limit: u32,
            _cursor: Option<&SyncCursor>,
        ) -> Result<FollowerPage> {
            if target.as_str() == "bad" {
                return Err(FollowSyncError::upstream(401, "unauthorized"));
            }
            Ok(FollowerPage {
                follower_ids: vec![FollowerId::new(1)],
                next_cursor: None,
            })
        }
    }

    fn scheduler(config: SchedulerConfig) -> Scheduler {
        let store = Arc::new(InMemoryMembershipStore::new());
        let options = SyncOptions::default().with_page_delay(Duration::ZERO);
        let orchestrator = Arc::new(SyncOrchestrator::new(Arc::new(OnePage), store, options));
        Scheduler::new(config, orchestrator)
    }

    #[test]
    fn test_config_builder() {
        let config = SchedulerConfig::new(["3", " ", "", "42"])
            .with_interval(Duration::from_secs(10))
            .with_run_timeout(Duration::from_secs(20))
            .with_strategy(SyncStrategy::Destructive);

        assert_eq!(config.targets, vec![TargetId::new("3"), TargetId::new("42")]);
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.run_timeout, Duration::from_secs(20));
        assert_eq!(config.strategy, SyncStrategy::Destructive);
    }

    #[tokio::test]
    async fn test_run_once_continues_after_failure() {
        let mut sched = scheduler(SchedulerConfig::new(["bad", "good"]));
        let summary = sched.run_once().await;

        assert_eq!(summary.run, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 1);
        assert!(!summary.timed_out);
        assert_eq!(summary.status(), "partial");
    }

    #[tokio::test]
    async fn test_spawn_runs_immediately_and_stops() {
        let sched = scheduler(SchedulerConfig::new(["good"]).with_interval(Duration::from_secs(3600)));
        let mut events = sched.subscribe();
        let handle = sched.spawn();

        loop {
            match events.recv().await.unwrap() {
                SchedulerEvent::RunCompleted { summary } => {
                    assert_eq!(summary.run, 1);
                    assert_eq!(summary.succeeded, 1);
                    break;
                }
                _ => continue,
            }
        }

        handle.stop().await.unwrap();

        let mut saw_stopped = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SchedulerEvent::Stopped) {
                saw_stopped = true;
            }
        }
        assert!(saw_stopped);
    }

    #[tokio::test]
    async fn test_run_exports_metrics_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("metrics.prom");
        let mut sched = scheduler(SchedulerConfig::new(["exported"]).with_metrics_file(&path));

        sched.run_once().await;

        let text = metrics::read_metrics_file(&path).unwrap();
        assert!(text.contains("followsync_scheduler_runs_total"));
        assert!(text.contains("target=\"exported\""));
    }

    #[tokio::test]
    async fn test_run_rejects_second_start() {
        let mut sched = scheduler(SchedulerConfig::new(["good"]));
        sched.command_rx = None;
        let err = sched.run().await.unwrap_err();
        assert!(matches!(err, FollowSyncError::Config(_)));
    }
}
