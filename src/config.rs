//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\playsync\config.toml
//! - macOS: ~/Library/Application Support/playsync/config.toml
//! - Linux: ~/.config/playsync/config.toml
//!
//! A different file can be given on the command line. Per-user API tokens
//! are not part of this file, they live on the user record.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::BackendKind;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings
    pub database: DatabaseConfig,

    /// Which backends may be used at all
    pub backends: BackendsConfig,

    /// ListenBrainz synchronization settings
    pub listenbrainz: ListenBrainzConfig,

    /// Local scrobbling settings
    pub scrobbling: ScrobblingConfig,
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(crate::db::DEFAULT_DB_NAME),
        }
    }
}

/// Per-backend enablement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub internal: bool,
    pub listenbrainz: bool,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            internal: true,
            listenbrainz: true,
        }
    }
}

impl BackendsConfig {
    /// Whether users selecting `kind` are served at all.
    pub fn is_enabled(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Internal => self.internal,
            BackendKind::ListenBrainz => self.listenbrainz,
        }
    }
}

/// ListenBrainz synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenBrainzConfig {
    /// API root, without trailing slash
    pub api_url: String,

    /// Per-cycle budget of remote feedback entries to fetch (0 disables sync)
    pub max_sync_feedback_count: usize,

    /// Hours between two feedback passes (0 disables sync)
    pub sync_feedbacks_period_hours: u64,

    /// Per-cycle budget of remote listens to fetch (0 disables sync)
    pub max_sync_listen_count: usize,

    /// Hours between two listen passes (0 disables sync)
    pub sync_listens_period_hours: u64,

    /// Entries requested per feedback page (1 to 1000)
    pub feedback_page_size: usize,

    /// Entries requested per listens page (1 to 1000)
    pub listen_page_size: usize,

    /// Delay before the first pass after startup
    pub initial_sync_delay_secs: u64,

    /// Upper bound of pending local entries pushed per user and per cycle
    pub max_pending_per_cycle: usize,
}

impl Default for ListenBrainzConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.listenbrainz.org".to_string(),
            max_sync_feedback_count: 1000,
            sync_feedbacks_period_hours: 1,
            max_sync_listen_count: 1000,
            sync_listens_period_hours: 1,
            feedback_page_size: 100,
            listen_page_size: 100,
            initial_sync_delay_secs: 30,
            max_pending_per_cycle: 100,
        }
    }
}

/// Largest page the ListenBrainz API serves in one request.
pub const MAX_PAGE_SIZE: usize = 1000;

impl ListenBrainzConfig {
    pub fn feedback_page_size(&self) -> usize {
        self.feedback_page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn listen_page_size(&self) -> usize {
        self.listen_page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Feedback pass period, or `None` when the periodic pass is disabled.
    pub fn feedbacks_period(&self) -> Option<Duration> {
        (self.sync_feedbacks_period_hours > 0 && self.max_sync_feedback_count > 0)
            .then(|| Duration::from_secs(self.sync_feedbacks_period_hours * 3600))
    }

    /// Listen pass period, or `None` when the periodic pass is disabled.
    pub fn listens_period(&self) -> Option<Duration> {
        (self.sync_listens_period_hours > 0 && self.max_sync_listen_count > 0)
            .then(|| Duration::from_secs(self.sync_listens_period_hours * 3600))
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_sync_delay_secs)
    }
}

/// Local scrobbling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrobblingConfig {
    /// Listens shorter than this are dropped by `listen_finished`
    pub min_listen_duration_secs: u64,
}

impl Default for ScrobblingConfig {
    fn default() -> Self {
        Self {
            min_listen_duration_secs: 5,
        }
    }
}

impl ScrobblingConfig {
    pub fn min_listen_duration(&self) -> Duration {
        Duration::from_secs(self.min_listen_duration_secs)
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("playsync"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from an explicit path
///
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to an explicit path
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
