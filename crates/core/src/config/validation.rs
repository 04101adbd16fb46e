//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

const MAX_RECORD_CEILING: usize = 1024 * 1024 * 1024;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` for an empty endpoint, and
    /// `ConfigError::Invalid` if:
    /// - an endpoint is not an http(s) URL
    /// - `timeout_ms` is outside 100ms..=5 minutes
    /// - `render_timeout_ms` is outside 1s..=30 minutes
    /// - `max_record_bytes` is 0 or exceeds 1GiB
    /// - `render_ttl_secs` is 0
    /// - `user_agent` is empty
    /// - `archive_id` is empty or contains `:`
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("cdx_server", &self.cdx_server),
            ("webhdfs_prefix", &self.webhdfs_prefix),
            ("wayback_server", &self.wayback_server),
            ("webrender_server", &self.webrender_server),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing {
                    field: field.into(),
                    hint: format!("Set MEMENTO_{} environment variable", field.to_uppercase()),
                });
            }
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(invalid(field, "must be an http:// or https:// URL"));
            }
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.render_timeout_ms < 1_000 {
            return Err(invalid("render_timeout_ms", "must be at least 1s"));
        }
        if self.render_timeout_ms > 1_800_000 {
            return Err(invalid("render_timeout_ms", "must not exceed 30 minutes (1800000ms)"));
        }

        if self.max_record_bytes == 0 {
            return Err(invalid("max_record_bytes", "must be greater than 0"));
        }
        if self.max_record_bytes > MAX_RECORD_CEILING {
            return Err(invalid("max_record_bytes", "must not exceed 1GiB"));
        }

        if self.render_ttl_secs == 0 {
            return Err(invalid("render_ttl_secs", "must be greater than 0"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.archive_id.is_empty() || self.archive_id.contains(':') {
            return Err(invalid("archive_id", "must be non-empty and must not contain ':'"));
        }

        if self.pwid_legacy_layout {
            tracing::warn!("pwid_legacy_layout is set; new PWIDs repeat the hour in place of minutes");
        }

        Ok(())
    }
}
