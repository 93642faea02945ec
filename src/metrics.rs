//! Prometheus metrics for sweeps and the scheduler
//!
//! Provides observability metrics for monitoring follower synchronization in production.
//! The daemon exports the registry to a text file after every run so that
//! other processes (the `metrics` command, a node_exporter textfile
//! collector) can read it.

use crate::{FollowSyncError, Result};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    /// Histogram: sweep duration per target (seconds)
    pub static ref SWEEP_DURATION: HistogramVec = register_histogram_vec!(
        "followsync_sweep_duration_seconds",
        "Duration of follower sweeps",
        &["target", "strategy"],
        vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]
    )
    .expect("Failed to create sweep_duration metric");

    /// Counter: pages fetched per target
    pub static ref PAGES_FETCHED: CounterVec = register_counter_vec!(
        "followsync_pages_fetched_total",
        "Follower pages fetched from upstream",
        &["target"]
    )
    .expect("Failed to create pages_fetched metric");

    /// Counter: follower ids received from upstream per target
    pub static ref FOLLOWERS_FETCHED: CounterVec = register_counter_vec!(
        "followsync_followers_fetched_total",
        "Follower ids received from upstream",
        &["target"]
    )
    .expect("Failed to create followers_fetched metric");

    /// Counter: follower ids that were new to the cache
    pub static ref FOLLOWERS_ADDED: CounterVec = register_counter_vec!(
        "followsync_followers_added_total",
        "Follower ids newly added to the cache",
        &["target"]
    )
    .expect("Failed to create followers_added metric");

    /// Counter: failed sweeps by error kind
    pub static ref SWEEP_ERRORS: CounterVec = register_counter_vec!(
        "followsync_sweep_errors_total",
        "Failed sweeps by error kind",
        &["target", "kind"]
    )
    .expect("Failed to create sweep_errors metric");

    /// Gauge: cached set size per target after the last sweep
    pub static ref CACHED_FOLLOWERS: GaugeVec = register_gauge_vec!(
        "followsync_cached_followers",
        "Cached follower set size per target",
        &["target"]
    )
    .expect("Failed to create cached_followers metric");

    /// Counter: scheduler runs by outcome
    pub static ref SCHEDULER_RUNS: CounterVec = register_counter_vec!(
        "followsync_scheduler_runs_total",
        "Scheduler runs by outcome",
        &["status"]
    )
    .expect("Failed to create scheduler_runs metric");

    /// Gauge: scheduler health status (1 = running, 0 = stopped)
    pub static ref HEALTH_STATUS: Gauge = register_gauge!(
        "followsync_health_status",
        "Scheduler health status (1 = running, 0 = stopped)"
    )
    .expect("Failed to create health_status metric");
}

/// Default metrics export file (~/.config/followsync/metrics.prom)
pub fn default_metrics_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("followsync");
    path.push("metrics.prom");
    path
}

/// Record a completed sweep duration
pub fn record_sweep_duration(target: &str, strategy: &str, duration_secs: f64) {
    SWEEP_DURATION
        .with_label_values(&[target, strategy])
        .observe(duration_secs);
}

/// Record one merged page
pub fn record_page(target: &str, fetched: usize, added: u64) {
    PAGES_FETCHED.with_label_values(&[target]).inc();
    FOLLOWERS_FETCHED
        .with_label_values(&[target])
        .inc_by(fetched as f64);
    FOLLOWERS_ADDED
        .with_label_values(&[target])
        .inc_by(added as f64);
}

/// Increment failed sweep counter
pub fn record_sweep_error(target: &str, kind: &str) {
    SWEEP_ERRORS.with_label_values(&[target, kind]).inc();
}

/// Set cached set size for a target
pub fn set_cached_followers(target: &str, count: u64) {
    CACHED_FOLLOWERS
        .with_label_values(&[target])
        .set(count as f64);
}

/// Record a scheduler run completion
pub fn record_scheduler_run(status: &str) {
    SCHEDULER_RUNS.with_label_values(&[status]).inc();
}

/// Set health status
pub fn set_health_status(healthy: bool) {
    HEALTH_STATUS.set(if healthy { 1.0 } else { 0.0 });
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| FollowSyncError::Other(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| FollowSyncError::Other(format!("Metrics are not UTF-8: {}", e)))
}

/// Write the current metrics to `path`, replacing it atomically
pub fn write_metrics_file(path: &Path) -> Result<()> {
    let text = encode_metrics()?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, text)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read metrics previously exported by a running daemon
pub fn read_metrics_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(FollowSyncError::Config(format!(
            "No metrics exported at {} (is the daemon running?)",
            path.display()
        )));
    }
    Ok(fs::read_to_string(path)?)
}
