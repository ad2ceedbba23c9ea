//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\trackline\config.toml
//! - macOS: ~/Library/Application Support/trackline/config.toml
//! - Linux: ~/.config/trackline/config.toml
//!
//! Every section uses `serde(default)`, so a partial file is valid. Raw
//! values are kept as written; the accessor methods apply fallbacks and
//! clamps so each worker or sweep resolves a typed policy once at startup.
//!
//! [`ConfigWatcher`] re-reads the file when it changes and publishes the new
//! value on a `tokio::sync::watch` channel. Stage supervisors restart their
//! worker when the value they depend on changes.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Download destination settings
    pub library: LibraryConfig,

    /// Search/download stage policies
    pub queue: QueueConfig,

    /// Stuck-track sweeps
    pub rescuer: RescuerConfig,

    /// Subscription synchronization
    pub subscriptions: SubscriptionConfig,

    /// History view
    pub history: HistoryConfig,

    /// Catalog response caching
    pub catalog: CatalogConfig,
}

/// Download destination settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root directory for downloaded files
    pub download_dir: PathBuf,

    /// File layout pattern (see `external::layout`)
    pub pattern: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            download_dir: dirs::audio_dir().unwrap_or_else(|| PathBuf::from("downloads")),
            pattern: crate::external::layout::DEFAULT_PATTERN.to_string(),
        }
    }
}

/// Search/download stage policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Concurrent search jobs
    pub search_concurrency: u32,

    /// Download dequeues per minute (0 = default)
    pub downloads_per_minute: u32,

    /// Attempts per download submission (0 disables automatic download
    /// submission; other values are clamped to 1..=10)
    pub download_attempts: u32,

    /// Base delay of the exponential download backoff
    pub retry_backoff_ms: u64,

    /// Idle poll interval of stage workers
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            search_concurrency: DEFAULT_SEARCH_CONCURRENCY,
            downloads_per_minute: DEFAULT_DOWNLOADS_PER_MINUTE,
            download_attempts: DEFAULT_DOWNLOAD_ATTEMPTS,
            retry_backoff_ms: 5_000,
            poll_interval_ms: 500,
        }
    }
}

pub const DEFAULT_SEARCH_CONCURRENCY: u32 = 3;
pub const DEFAULT_DOWNLOADS_PER_MINUTE: u32 = 10;
pub const DEFAULT_DOWNLOAD_ATTEMPTS: u32 = 3;
pub const MAX_DOWNLOAD_ATTEMPTS: u32 = 10;

impl QueueConfig {
    /// Concurrent search jobs, never zero.
    pub fn search_concurrency(&self) -> usize {
        match self.search_concurrency {
            0 => DEFAULT_SEARCH_CONCURRENCY as usize,
            n => n as usize,
        }
    }

    /// Download throughput ceiling per minute.
    pub fn downloads_per_minute(&self) -> NonZeroU32 {
        NonZeroU32::new(self.downloads_per_minute)
            .or(NonZeroU32::new(DEFAULT_DOWNLOADS_PER_MINUTE))
            .unwrap_or(NonZeroU32::MIN)
    }

    /// Attempts for a download submission, or None when automatic download
    /// submission is disabled.
    pub fn download_attempts(&self) -> Option<u32> {
        match self.download_attempts {
            0 => None,
            n => Some(n.clamp(1, MAX_DOWNLOAD_ATTEMPTS)),
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

/// Stuck-track sweeps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RescuerConfig {
    /// Minutes between periodic sweeps (non-positive = 5)
    pub interval_minutes: i64,

    /// Minutes after creation before an active track counts as stuck
    /// (non-positive = 10)
    pub stuck_timeout_minutes: i64,
}

impl Default for RescuerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            stuck_timeout_minutes: 10,
        }
    }
}

impl RescuerConfig {
    pub fn interval(&self) -> Duration {
        minutes_or(self.interval_minutes, 5)
    }

    pub fn stuck_timeout(&self) -> Duration {
        minutes_or(self.stuck_timeout_minutes, 10)
    }
}

/// Subscription synchronization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Minutes between sync passes (non-positive = 60)
    pub interval_minutes: i64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
        }
    }
}

impl SubscriptionConfig {
    pub fn interval(&self) -> Duration {
        minutes_or(self.interval_minutes, 60)
    }
}

/// History view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Raw entries folded into the summary view
    pub page_limit: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { page_limit: 500 }
    }
}

/// Catalog response caching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Seconds a catalog response stays cached
    pub cache_ttl_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
        }
    }
}

impl CatalogConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn minutes_or(value: i64, fallback: u64) -> Duration {
    let minutes = if value > 0 { value as u64 } else { fallback };
    Duration::from_secs(minutes.saturating_mul(60))
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("trackline"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
pub fn load() -> Config {
    match config_path() {
        Some(path) => load_from(&path),
        None => {
            tracing::warn!(target: "config", "Could not determine config directory, using defaults");
            Config::default()
        }
    }
}

/// Load configuration from a specific file
///
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!(target: "config", "No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!(target: "config", "Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!(target: "config", "Failed to parse config file {:?}: {}", path, e);
                tracing::warn!(target: "config", "Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!(target: "config", "Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to a file
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let dir = path.parent().ok_or(ConfigError::NoConfigDir)?;

    std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!(target: "config", "Saved config to {:?}", path);
    Ok(())
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

// ============================================================================
// Hot Reload
// ============================================================================

/// Watches the config file and publishes reparsed configs.
///
/// Dropping the watcher stops watching; receivers keep the last value.
pub struct ConfigWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    tx: watch::Sender<Config>,
}

impl ConfigWatcher {
    /// Load `path` and start watching it.
    ///
    /// The parent directory is watched so editors that replace the file on
    /// save are handled.
    pub fn new(path: PathBuf) -> Result<Self, ConfigError> {
        let (tx, _) = watch::channel(load_from(&path));
        let publish = tx.clone();
        let file = path.clone();

        let mut debouncer = new_debouncer(
            Duration::from_millis(500),
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    if events.iter().any(|e| e.paths.iter().any(|p| p == &file)) {
                        let fresh = load_from(&file);
                        let changed = publish.send_if_modified(|current| {
                            if *current == fresh {
                                false
                            } else {
                                *current = fresh;
                                true
                            }
                        });
                        if changed {
                            tracing::info!(target: "config", path = %file.display(), "Config reloaded");
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        tracing::warn!(target: "config", "Config watch error: {}", e);
                    }
                }
            },
        )
        .map_err(|e| ConfigError::Watch(e.to_string()))?;

        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or(ConfigError::NoConfigDir)?;
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;
        debouncer
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::Watch(e.to_string()))?;

        Ok(Self {
            _debouncer: debouncer,
            tx,
        })
    }

    /// Subscribe to config updates.
    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.tx.subscribe()
    }

    /// Current config value.
    pub fn current(&self) -> Config {
        self.tx.borrow().clone()
    }
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

    #[error("Failed to watch config: {0}")]
    Watch(String),
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        crate::error::Error::config(e.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
