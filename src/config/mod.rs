//! Configuration system
//!
//! Loads ~/.config/followsync/config.yaml (or an explicit path) with support for:
//! - Target lists and a default target for follow checks
//! - Neynar or Farcaster upstream with per-source credentials
//! - Sweep, scheduler and store tuning
//! - Environment overrides (TARGET_FIDS, TARGET_FID, NEYNAR_API_KEY, ...)

mod followsync_config;
pub mod validation;

pub use followsync_config::{
    parse_targets, FollowSyncConfig, SchedulerSettings, StoreSettings, SyncSettings,
    UpstreamSettings,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
