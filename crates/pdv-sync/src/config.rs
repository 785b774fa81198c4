//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PDV_API_URL=https://api.example.com/loja01/                        │
//! │     PDV_SYNC_MODE=manual                                               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pdv-sync/sync.toml (Linux)                               │
//! │     ~/Library/Application Support/br.pdv.pdv-sync/sync.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     SyncMode::Auto, 60 s interval, page limit 999                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [api]
//! base_url = "https://api.example.com/loja01/"
//! tenant = "loja01"           # optional; else taken from base_url path
//! request_timeout_secs = 30
//!
//! [sync]
//! mode = "auto"               # auto | manual | offline
//! interval_secs = 60
//! page_limit = 999
//!
//! [database]
//! path = "/var/lib/pdv/pdv.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use pdv_core::DEFAULT_PAGE_LIMIT;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sync Mode
// =============================================================================

/// How the background agent behaves.
///
/// ## Mode Selection
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                        Sync Mode Behavior                               │
/// │                                                                         │
/// │  AUTO (Default)                                                        │
/// │  • Agent starts on launch and syncs every `interval_secs`              │
/// │  • Mutations push immediately when online                              │
/// │                                                                         │
/// │  MANUAL                                                                │
/// │  • Agent stays stopped until START_SYNC or FORCE_SYNC                  │
/// │  • Mutations still push immediately when online                        │
/// │                                                                         │
/// │  OFFLINE                                                               │
/// │  • Device starts marked offline; nothing reaches the network           │
/// │  • Every mutation is queued as pending-*                                │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Auto,
    Manual,
    Offline,
}

impl SyncMode {
    /// Returns true if the agent should start its timer on launch.
    pub fn starts_automatically(&self) -> bool {
        matches!(self, SyncMode::Auto)
    }

    /// Returns true if sync is enabled at all.
    pub fn is_sync_enabled(&self) -> bool {
        !matches!(self, SyncMode::Offline)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Auto => write!(f, "auto"),
            SyncMode::Manual => write!(f, "manual"),
            SyncMode::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(SyncMode::Auto),
            "manual" => Ok(SyncMode::Manual),
            "offline" | "disabled" => Ok(SyncMode::Offline),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown sync mode: '{}'. Valid options: auto, manual, offline",
                other
            ))),
        }
    }
}

// =============================================================================
// API Settings
// =============================================================================

/// Where and how to reach the PDV backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the API. Its first path segment is used as the tenant
    /// when neither the session nor `tenant` provide one.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Tenant path segment; overrides the one in `base_url`.
    #[serde(default)]
    pub tenant: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Refresh the access token this long before its `exp` claim (seconds).
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000/".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_refresh_margin() -> u64 {
    300
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            tenant: None,
            request_timeout_secs: default_request_timeout(),
            refresh_margin_secs: default_refresh_margin(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub mode: SyncMode,

    /// Interval between background passes (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// `Limit` sent with list requests.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

fn default_interval() -> u64 {
    60
}

fn default_page_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: SyncMode::default(),
            interval_secs: default_interval(),
            page_limit: default_page_limit(),
        }
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Local store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path; defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config pointing at `base_url`, otherwise default.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.api.base_url = base_url.into();
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = Url::parse(&self.api.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.sync.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_secs must be greater than 0".into(),
            ));
        }

        if self.sync.page_limit == 0 {
            return Err(SyncError::InvalidConfig(
                "page_limit must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PDV_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Ok(tenant) = std::env::var("PDV_TENANT") {
            self.api.tenant = Some(tenant).filter(|t| !t.is_empty());
        }

        if let Ok(timeout) = std::env::var("PDV_REQUEST_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse::<u64>() {
                self.api.request_timeout_secs = t;
            }
        }

        if let Ok(mode) = std::env::var("PDV_SYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding sync mode from environment");
                    self.sync.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown sync mode in environment"),
            }
        }

        if let Ok(interval) = std::env::var("PDV_SYNC_INTERVAL_SECS") {
            if let Ok(i) = interval.parse::<u64>() {
                self.sync.interval_secs = i;
            }
        }

        if let Ok(limit) = std::env::var("PDV_PAGE_LIMIT") {
            if let Ok(l) = limit.parse::<u32>() {
                self.sync.page_limit = l;
            }
        }

        if let Ok(path) = std::env::var("PDV_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("br", "pdv", "pdv-sync")
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the sync mode.
    pub fn mode(&self) -> SyncMode {
        self.sync.mode
    }

    /// Returns true if sync is enabled.
    pub fn is_sync_enabled(&self) -> bool {
        self.sync.mode.is_sync_enabled()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// The database file, falling back to the platform data directory and
    /// finally the working directory.
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            Self::project_dirs()
                .map(|dirs| dirs.data_dir().join("pdv.db"))
                .unwrap_or_else(|| PathBuf::from("pdv.db"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_mode_parsing() {
        assert_eq!("auto".parse::<SyncMode>().unwrap(), SyncMode::Auto);
        assert_eq!("MANUAL".parse::<SyncMode>().unwrap(), SyncMode::Manual);
        assert_eq!("disabled".parse::<SyncMode>().unwrap(), SyncMode::Offline);
        assert!("primary".parse::<SyncMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.sync.mode, SyncMode::Auto);
        assert_eq!(config.sync.page_limit, 999);
        assert_eq!(config.api.request_timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.api.base_url = "ftp://files.example.com".into();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.api.base_url = "not a url".into();
        assert!(config.validate().is_err());

        config.api.base_url = "https://api.example.com/loja01/".into();
        assert!(config.validate().is_ok());

        config.sync.page_limit = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [api]
            base_url = "https://api.example.com/loja01/"

            [sync]
            mode = "manual"
            "#,
        )
        .unwrap();

        assert_eq!(config.mode(), SyncMode::Manual);
        assert_eq!(config.sync.interval_secs, 60);
        assert!(config.api.tenant.is_none());
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[api]"));
        assert!(toml_str.contains("[sync]"));
    }

    #[test]
    fn test_database_path_override() {
        let mut config = SyncConfig::default();
        config.database.path = Some(PathBuf::from("/tmp/pdv-test.db"));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/pdv-test.db"));
    }
}
