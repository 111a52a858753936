//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/tattle/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/tattle/` (~/.config/tattle/)
//! - Data: `$XDG_DATA_HOME/tattle/` (~/.local/share/tattle/)
//! - State/Logs: `$XDG_STATE_HOME/tattle/` (~/.local/state/tattle/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Monitor loop timing
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Duplicate-suppression tuning
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Outbound message chunking and pacing
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Webhook messenger (optional)
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Override for the monitored project's working directory.
    ///
    /// When unset, the monitor asks the terminal collaborator for the
    /// driving process's cwd each cycle.
    pub project_path: Option<PathBuf>,

    /// Override for the agent's log root (defaults to ~/.claude/projects)
    pub log_root: Option<PathBuf>,
}

/// Monitor loop timing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Poll interval between cycles in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Seconds between checkpoint flushes
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Seconds between forced session rescans (catches silent rotations)
    #[serde(default = "default_force_resolve_secs")]
    pub force_resolve_secs: u64,

    /// Cycles between stale-dedup cleanup passes
    #[serde(default = "default_cleanup_every_cycles")]
    pub cleanup_every_cycles: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            flush_interval_secs: default_flush_interval_secs(),
            force_resolve_secs: default_force_resolve_secs(),
            cleanup_every_cycles: default_cleanup_every_cycles(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_flush_interval_secs() -> u64 {
    15
}

fn default_force_resolve_secs() -> u64 {
    30
}

fn default_cleanup_every_cycles() -> u64 {
    50
}

/// Duplicate-suppression configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    /// Seconds a seen identifier stays suppressed
    #[serde(default = "default_dedup_ttl_secs")]
    pub ttl_secs: u64,

    /// In-memory fast-path cache capacity
    #[serde(default = "default_dedup_cache_size")]
    pub cache_size: usize,

    /// Upper bound on persisted identifiers; oldest are trimmed past this
    #[serde(default = "default_max_persisted_ids")]
    pub max_persisted_ids: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_dedup_ttl_secs(),
            cache_size: default_dedup_cache_size(),
            max_persisted_ids: default_max_persisted_ids(),
        }
    }
}

fn default_dedup_ttl_secs() -> u64 {
    86_400
}

fn default_dedup_cache_size() -> usize {
    512
}

fn default_max_persisted_ids() -> usize {
    10_000
}

/// Outbound chunking and pacing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    /// Maximum characters per outbound chunk
    #[serde(default = "default_max_chunk_len")]
    pub max_chunk_len: usize,

    /// Milliseconds to wait between chunks of one split message
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,

    /// Character cap when inlining a referenced plan document
    #[serde(default = "default_plan_excerpt_len")]
    pub plan_excerpt_len: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: default_max_chunk_len(),
            chunk_delay_ms: default_chunk_delay_ms(),
            plan_excerpt_len: default_plan_excerpt_len(),
        }
    }
}

fn default_max_chunk_len() -> usize {
    1900
}

fn default_chunk_delay_ms() -> u64 {
    400
}

fn default_plan_excerpt_len() -> usize {
    1500
}

/// Webhook messenger configuration
///
/// When enabled, deliverable text is POSTed as JSON to the configured
/// endpoint instead of (or in addition to) whatever sender the embedding
/// application wires in.
#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Enable/disable the webhook messenger
    #[serde(default)]
    pub enabled: bool,

    /// Endpoint URL (e.g. `https://hooks.example.com/notify`)
    pub url: Option<String>,

    /// Bearer token (optional)
    pub token: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            token: None,
            timeout_secs: default_webhook_timeout(),
        }
    }
}

impl WebhookConfig {
    /// Check if the webhook is properly configured and enabled
    pub fn is_ready(&self) -> bool {
        self.enabled && self.url.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.url.is_none() {
            return Err(Error::Config(
                "webhook.url is required when webhook is enabled".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "webhook.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_webhook_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.webhook.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/tattle/config.toml` (~/.config/tattle/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("tattle").join("config.toml")
    }

    /// Returns the data directory path (for the checkpoint file)
    ///
    /// `$XDG_DATA_HOME/tattle/` (~/.local/share/tattle/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("tattle")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/tattle/` (~/.local/state/tattle/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("tattle")
    }

    /// Returns the checkpoint file path
    ///
    /// `$XDG_DATA_HOME/tattle/checkpoint.json`
    pub fn checkpoint_path() -> PathBuf {
        Self::data_dir().join("checkpoint.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/tattle/tattle.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("tattle.log")
    }

    /// Returns the agent's session log root (~/.claude/projects by default)
    pub fn session_log_root(&self) -> PathBuf {
        self.log_root
            .clone()
            .unwrap_or_else(|| home_dir().join(".claude").join("projects"))
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
