//! followsync configuration file handling
//!
//! Loads ~/.config/followsync/config.yaml and layers environment overrides on top.

use crate::cache::{SqliteStoreConfig, DEFAULT_KEY_PREFIX};
use crate::ids::TargetId;
use crate::integrations::{UpstreamConfig, UpstreamSource, DEFAULT_PAGE_SIZE};
use crate::scheduler::SchedulerConfig;
use crate::sync::{SyncOptions, SyncStrategy};
use crate::{FollowSyncError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upstream API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSettings {
    /// Which follower API to call (neynar, farcaster)
    #[serde(default)]
    pub source: UpstreamSource,

    /// Override for the source's default base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key or bearer token. Usually supplied through the environment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub credential: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            source: UpstreamSource::default(),
            base_url: None,
            credential: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Followers requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Pause between page requests in milliseconds
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Deadline for one sweep in seconds
    #[serde(default = "default_sweep_timeout_secs")]
    pub sweep_timeout_secs: u64,

    /// Strategy for scheduled sweeps (incremental, destructive)
    #[serde(default)]
    pub strategy: SyncStrategy,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_page_delay_ms() -> u64 {
    500
}

fn default_sweep_timeout_secs() -> u64 {
    240
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_delay_ms: default_page_delay_ms(),
            sweep_timeout_secs: default_sweep_timeout_secs(),
            strategy: SyncStrategy::default(),
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Seconds between runs
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Deadline for one run over all targets in seconds
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// Metrics text file written after every run; `null` disables the export
    #[serde(default = "default_metrics_file")]
    pub metrics_file: Option<PathBuf>,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_run_timeout_secs() -> u64 {
    300
}

fn default_metrics_file() -> Option<PathBuf> {
    Some(crate::metrics::default_metrics_path())
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            run_timeout_secs: default_run_timeout_secs(),
            metrics_file: default_metrics_file(),
        }
    }
}

/// Membership store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite database path
    #[serde(default = "crate::cache::default_db_path")]
    pub path: PathBuf,

    /// Namespace for follower set and last-sync keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: crate::cache::default_db_path(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// followsync configuration
///
/// Represents the complete ~/.config/followsync/config.yaml file. Every
/// section is optional; missing fields take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FollowSyncConfig {
    /// Targets swept by the scheduler, in order
    #[serde(default)]
    pub targets: Vec<TargetId>,

    /// Target used for follow checks; the first target when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target: Option<TargetId>,

    #[serde(default)]
    pub upstream: UpstreamSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub store: StoreSettings,
}

impl FollowSyncConfig {
    /// Create a configuration with all defaults and no targets
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the default path (~/.config/followsync/config.yaml)
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        Self::load(&path)
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(FollowSyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading followsync configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            targets = config.targets.len(),
            source = %config.upstream.source,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load an explicit file, or the default file if it exists, or defaults.
    ///
    /// Environment overrides are applied on top in every case.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)?
                } else {
                    tracing::debug!(path = %path.display(), "No config file, using defaults");
                    Self::new()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving followsync configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/followsync/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("followsync");
        path.push("config.yaml");
        path
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Unparseable numeric values are ignored with a warning and the
    /// configured value is kept.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("FOLLOWSYNC_SOURCE") {
            match raw.parse::<UpstreamSource>() {
                Ok(source) => self.upstream.source = source,
                Err(e) => tracing::warn!(value = %raw, error = %e, "Ignoring FOLLOWSYNC_SOURCE"),
            }
        }

        if let Some(raw) = lookup("TARGET_FIDS") {
            self.targets = parse_targets(&raw);
        }

        if let Some(raw) = lookup("TARGET_FID") {
            let target = TargetId::new(raw.trim());
            if !target.is_blank() {
                self.default_target = Some(target);
            }
        }

        if let Some(credential) = lookup(self.upstream.source.credential_env()) {
            if !credential.trim().is_empty() {
                self.upstream.credential = credential.trim().to_string();
            }
        }

        if let Some(raw) = lookup("NEYNAR_LIMIT") {
            match raw.trim().parse::<u32>() {
                Ok(limit) if limit > 0 => self.sync.page_size = limit,
                _ => tracing::warn!(value = %raw, "Ignoring NEYNAR_LIMIT, not a positive integer"),
            }
        }

        if let Some(raw) = lookup("FOLLOWSYNC_PAGE_DELAY_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.sync.page_delay_ms = ms,
                Err(_) => tracing::warn!(value = %raw, "Ignoring FOLLOWSYNC_PAGE_DELAY_MS"),
            }
        }

        if let Some(raw) = lookup("FOLLOWSYNC_DB_PATH") {
            if !raw.trim().is_empty() {
                self.store.path = PathBuf::from(raw.trim());
            }
        }

        if let Some(raw) = lookup("FOLLOWSYNC_METRICS_FILE") {
            if !raw.trim().is_empty() {
                self.scheduler.metrics_file = Some(PathBuf::from(raw.trim()));
            }
        }
    }

    /// Target used for follow checks: explicit default, else the first target
    pub fn default_target(&self) -> Option<&TargetId> {
        self.default_target
            .as_ref()
            .filter(|t| !t.is_blank())
            .or_else(|| self.targets.iter().find(|t| !t.is_blank()))
    }

    /// Connection settings for the HTTP page fetcher
    pub fn upstream_config(&self) -> UpstreamConfig {
        let mut config = UpstreamConfig::new(self.upstream.source, self.upstream.credential.clone())
            .with_request_timeout(Duration::from_secs(self.upstream.request_timeout_secs));
        if let Some(ref url) = self.upstream.base_url {
            config = config.with_base_url(url.clone());
        }
        config
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions::default()
            .with_page_size(self.sync.page_size)
            .with_page_delay(Duration::from_millis(self.sync.page_delay_ms))
            .with_sweep_timeout(Duration::from_secs(self.sync.sweep_timeout_secs))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let mut config = SchedulerConfig::new(self.targets.iter().cloned())
            .with_interval(Duration::from_secs(self.scheduler.interval_secs))
            .with_run_timeout(Duration::from_secs(self.scheduler.run_timeout_secs))
            .with_strategy(self.sync.strategy);
        config.metrics_file = self.scheduler.metrics_file.clone();
        config
    }

    pub fn store_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.store.path.clone(),
            key_prefix: self.store.key_prefix.clone(),
            ..Default::default()
        }
    }
}

/// Split a comma-separated target list, trimming entries and dropping empties
pub fn parse_targets(raw: &str) -> Vec<TargetId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(TargetId::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = FollowSyncConfig::new();
        assert!(config.targets.is_empty());
        assert_eq!(config.upstream.source, UpstreamSource::Neynar);
        assert_eq!(config.upstream.request_timeout_secs, 30);
        assert_eq!(config.sync.page_size, 100);
        assert_eq!(config.sync.page_delay_ms, 500);
        assert_eq!(config.sync.sweep_timeout_secs, 240);
        assert_eq!(config.scheduler.interval_secs, 300);
        assert_eq!(config.scheduler.run_timeout_secs, 300);
        assert_eq!(config.store.key_prefix, "farcaster");
    }

    #[test]
    fn test_parse_targets() {
        let targets = parse_targets(" 3, ,42,,7 ");
        assert_eq!(
            targets,
            vec![TargetId::new("3"), TargetId::new("42"), TargetId::new("7")]
        );
        assert!(parse_targets("").is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = FollowSyncConfig::new();
        config.apply_env_from(env(&[
            ("TARGET_FIDS", "3,42"),
            ("TARGET_FID", "42"),
            ("NEYNAR_API_KEY", "secret"),
            ("NEYNAR_LIMIT", "50"),
            ("FOLLOWSYNC_PAGE_DELAY_MS", "0"),
            ("FOLLOWSYNC_DB_PATH", "/tmp/f.db"),
            ("FOLLOWSYNC_METRICS_FILE", "/tmp/f.prom"),
        ]));

        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.default_target(), Some(&TargetId::new("42")));
        assert_eq!(config.upstream.credential, "secret");
        assert_eq!(config.sync.page_size, 50);
        assert_eq!(config.sync.page_delay_ms, 0);
        assert_eq!(config.store.path, PathBuf::from("/tmp/f.db"));
        assert_eq!(config.scheduler.metrics_file, Some(PathBuf::from("/tmp/f.prom")));
        assert_eq!(
            config.scheduler_config().metrics_file,
            Some(PathBuf::from("/tmp/f.prom"))
        );
    }

    #[test]
    fn test_invalid_limit_ignored() {
        let mut config = FollowSyncConfig::new();
        config.apply_env_from(env(&[("NEYNAR_LIMIT", "0")]));
        assert_eq!(config.sync.page_size, 100);
        config.apply_env_from(env(&[("NEYNAR_LIMIT", "lots")]));
        assert_eq!(config.sync.page_size, 100);
    }

    #[test]
    fn test_credential_follows_source() {
        let mut config = FollowSyncConfig::new();
        config.apply_env_from(env(&[
            ("FOLLOWSYNC_SOURCE", "farcaster"),
            ("NEYNAR_API_KEY", "wrong"),
            ("FARCASTER_BEARER_TOKEN", "bearer"),
        ]));
        assert_eq!(config.upstream.source, UpstreamSource::Farcaster);
        assert_eq!(config.upstream.credential, "bearer");
    }

    #[test]
    fn test_default_target_falls_back_to_first() {
        let mut config = FollowSyncConfig::new();
        assert!(config.default_target().is_none());
        config.targets = parse_targets("5,6");
        assert_eq!(config.default_target(), Some(&TargetId::new("5")));
    }

    #[test]
    fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = FollowSyncConfig::new();
        config.targets = parse_targets("3");
        config.sync.strategy = SyncStrategy::Destructive;
        config.save(path).unwrap();

        let loaded = FollowSyncConfig::load(path).unwrap();
        assert_eq!(loaded.targets, vec![TargetId::new("3")]);
        assert_eq!(loaded.sync.strategy, SyncStrategy::Destructive);
    }

    #[test]
    fn test_partial_yaml() {
        let config: FollowSyncConfig = serde_yaml::from_str(
            "targets: [\"3\"]\nupstream:\n  source: farcaster\nscheduler:\n  interval_secs: 60\n",
        )
        .unwrap();
        assert_eq!(config.upstream.source, UpstreamSource::Farcaster);
        assert_eq!(config.scheduler.interval_secs, 60);
        assert_eq!(config.scheduler.run_timeout_secs, 300);
        assert_eq!(config.sync.page_size, 100);
    }

    #[test]
    fn test_derived_settings() {
        let mut config = FollowSyncConfig::new();
        config.targets = parse_targets("3,4");
        config.sync.page_delay_ms = 10;

        let options = config.sync_options();
        assert_eq!(options.page_delay, Duration::from_millis(10));
        assert_eq!(options.sweep_timeout, Duration::from_secs(240));

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.targets.len(), 2);
        assert_eq!(scheduler.interval, Duration::from_secs(300));

        let upstream = config.upstream_config();
        assert_eq!(upstream.request_timeout, Duration::from_secs(30));
        assert!(upstream.base_url.is_none());
    }

    #[test]
    fn test_default_path() {
        let path = FollowSyncConfig::default_path();
        assert!(path.ends_with("followsync/config.yaml"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = FollowSyncConfig::load("/nonexistent/config.yaml");
        assert!(matches!(result, Err(FollowSyncError::Config(_))));
    }
}
