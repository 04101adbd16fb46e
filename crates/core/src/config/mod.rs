//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (MEMENTO_*)
//! 2. TOML config file (if MEMENTO_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::pwid::{DEFAULT_ARCHIVE_ID, PwidLayout};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (MEMENTO_*)
/// 2. TOML config file (if MEMENTO_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite render cache.
    ///
    /// Set via MEMENTO_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Capture index (CDX) query endpoint.
    ///
    /// Set via MEMENTO_CDX_SERVER environment variable.
    #[serde(default = "default_cdx_server")]
    pub cdx_server: String,

    /// Storage service prefix; the record file name is appended.
    ///
    /// Set via MEMENTO_WEBHDFS_PREFIX environment variable.
    #[serde(default = "default_webhdfs_prefix")]
    pub webhdfs_prefix: String,

    /// User name sent to the storage service.
    #[serde(default = "default_webhdfs_user")]
    pub webhdfs_user: String,

    /// Access-control endpoint; the URL under test is appended.
    ///
    /// Set via MEMENTO_WAYBACK_SERVER environment variable.
    #[serde(default = "default_wayback_server")]
    pub wayback_server: String,

    /// Screenshot render service endpoint.
    ///
    /// Set via MEMENTO_WEBRENDER_SERVER environment variable.
    #[serde(default = "default_webrender_server")]
    pub webrender_server: String,

    /// Archive identifier written into and required of PWIDs.
    #[serde(default = "default_archive_id")]
    pub archive_id: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via MEMENTO_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Index and storage request timeout in milliseconds.
    ///
    /// Set via MEMENTO_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Render service timeout in milliseconds.
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// How long rendered images stay cached, in seconds.
    #[serde(default = "default_render_ttl_secs")]
    pub render_ttl_secs: u64,

    /// Ceiling on compressed and decompressed record size.
    ///
    /// Set via MEMENTO_MAX_RECORD_BYTES environment variable.
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,

    /// Issue PWIDs in the older hour-repeated timestamp layout.
    #[serde(default)]
    pub pwid_legacy_layout: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./memento-cache.sqlite")
}

fn default_cdx_server() -> String {
    "http://cdx.api.wa.bl.uk/data-heritrix".into()
}

fn default_webhdfs_prefix() -> String {
    "http://warc-server.api.wa.bl.uk/webhdfs/v1/by-filename/".into()
}

fn default_webhdfs_user() -> String {
    "access".into()
}

fn default_wayback_server() -> String {
    "https://www.webarchive.org.uk/wayback/archive/".into()
}

fn default_webrender_server() -> String {
    "http://webrender:8010/render".into()
}

fn default_archive_id() -> String {
    DEFAULT_ARCHIVE_ID.into()
}

fn default_user_agent() -> String {
    "memento/0.1".into()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_render_timeout_ms() -> u64 {
    300_000
}

fn default_render_ttl_secs() -> u64 {
    3600
}

fn default_max_record_bytes() -> usize {
    104_857_600 // 100MB
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cdx_server: default_cdx_server(),
            webhdfs_prefix: default_webhdfs_prefix(),
            webhdfs_user: default_webhdfs_user(),
            wayback_server: default_wayback_server(),
            webrender_server: default_webrender_server(),
            archive_id: default_archive_id(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            render_timeout_ms: default_render_timeout_ms(),
            render_ttl_secs: default_render_ttl_secs(),
            max_record_bytes: default_max_record_bytes(),
            pwid_legacy_layout: false,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn render_ttl(&self) -> Duration {
        Duration::from_secs(self.render_ttl_secs)
    }

    pub fn pwid_layout(&self) -> PwidLayout {
        if self.pwid_legacy_layout { PwidLayout::Legacy } else { PwidLayout::Iso }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `MEMENTO_`
    /// 2. TOML file from `MEMENTO_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("MEMENTO_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        Self::extract(figment.merge(Env::prefixed("MEMENTO_").ignore(&["config_file"])))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
