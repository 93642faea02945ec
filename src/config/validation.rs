//! Configuration validation
//!
//! Validates followsync configuration for correctness:
//! - At least one target, no blanks, no duplicates
//! - A credential for the selected upstream
//! - Valid base URL
//! - Non-zero sizes, intervals and deadlines

use super::followsync_config::FollowSyncConfig;
use crate::FollowSyncError;
use std::collections::HashSet;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a followsync configuration, collecting every problem
pub fn validate_config(config: &FollowSyncConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.targets.is_empty() {
        errors.push(ValidationError::new(
            "targets",
            "At least one target must be defined (config file or TARGET_FIDS)",
        ));
    }

    let mut seen = HashSet::new();
    for target in &config.targets {
        if target.is_blank() {
            errors.push(ValidationError::new("targets", "Target id cannot be empty"));
        } else if !seen.insert(target.as_str()) {
            errors.push(ValidationError::new(
                "targets",
                format!("Duplicate target: {}", target),
            ));
        }
    }

    if let Some(ref target) = config.default_target {
        if !target.is_blank() && !seen.contains(target.as_str()) {
            tracing::warn!(
                default_target = %target,
                "Default target is not swept by the scheduler; follow checks may see a stale set"
            );
        }
    }

    if config.upstream.credential.trim().is_empty() {
        errors.push(ValidationError::new(
            "upstream.credential",
            format!(
                "No credential for {} (set {})",
                config.upstream.source,
                config.upstream.source.credential_env()
            ),
        ));
    }

    if let Some(ref url) = config.upstream.base_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            errors.push(ValidationError::new(
                "upstream.base_url",
                format!("Invalid URL: {}", url),
            ));
        }
    }

    let non_zero = [
        ("upstream.request_timeout_secs", config.upstream.request_timeout_secs),
        ("sync.page_size", u64::from(config.sync.page_size)),
        ("sync.sweep_timeout_secs", config.sync.sweep_timeout_secs),
        ("scheduler.interval_secs", config.scheduler.interval_secs),
        ("scheduler.run_timeout_secs", config.scheduler.run_timeout_secs),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::new(field, "Must be greater than 0"));
        }
    }

    if config.store.key_prefix.trim().is_empty() {
        errors.push(ValidationError::new(
            "store.key_prefix",
            "Key prefix cannot be empty",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate configuration and return a Result
pub fn validate_config_result(config: &FollowSyncConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        FollowSyncError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
