//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/threadrelay/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/threadrelay/` (~/.config/threadrelay/)
//! - State/Logs: `$XDG_STATE_HOME/threadrelay/` (~/.local/state/threadrelay/)
//!
//! The loaded [`Config`] is built once at startup and handed by reference to
//! every component constructor; nothing reads settings from a global.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

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

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Expand a leading `~/` against the home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Transcript poll loop
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Terminal status-poll loop
    #[serde(default)]
    pub status: StatusConfig,

    /// Outbound message queue
    #[serde(default)]
    pub queue: QueueConfig,

    /// tmux adapter settings (used by the binaries)
    #[serde(default)]
    pub tmux: TmuxConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transcript monitoring configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Milliseconds between transcript polls
    #[serde(default = "default_monitor_poll_ms")]
    pub poll_interval_ms: u64,

    /// Root of per-project transcript directories (default ~/.claude/projects)
    #[serde(default)]
    pub projects_dir: Option<PathBuf>,

    /// Working directory the assistant is launched in, used to derive the
    /// project directory for transcripts that do not exist yet
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Start newly registered sessions at end-of-file instead of replaying history
    #[serde(default = "default_true")]
    pub skip_existing: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_monitor_poll_ms(),
            projects_dir: None,
            working_dir: None,
            skip_existing: true,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Resolved projects directory
    pub fn projects_dir(&self) -> PathBuf {
        self.projects_dir
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| home_dir().join(".claude").join("projects"))
    }

    /// Resolved working directory, if configured
    pub fn working_dir(&self) -> Option<PathBuf> {
        self.working_dir.as_deref().map(expand_tilde)
    }
}

fn default_monitor_poll_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

/// Terminal status-poll configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StatusConfig {
    /// Milliseconds between terminal snapshots
    #[serde(default = "default_status_poll_ms")]
    pub poll_interval_ms: u64,

    /// Foreground process names meaning the assistant is still running
    #[serde(default = "default_assistant_process_names")]
    pub assistant_process_names: Vec<String>,

    /// Foreground process names meaning control went back to a shell
    #[serde(default = "default_shell_process_names")]
    pub shell_process_names: Vec<String>,

    /// Text of the status message shown while the assistant is busy
    #[serde(default = "default_busy_text")]
    pub busy_text: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_status_poll_ms(),
            assistant_process_names: default_assistant_process_names(),
            shell_process_names: default_shell_process_names(),
            busy_text: default_busy_text(),
        }
    }
}

impl StatusConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_status_poll_ms() -> u64 {
    1000
}

fn default_assistant_process_names() -> Vec<String> {
    vec!["claude".to_string(), "node".to_string()]
}

fn default_shell_process_names() -> Vec<String> {
    ["bash", "zsh", "sh", "fish", "dash", "ksh", "tcsh"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_busy_text() -> String {
    "⏳ Working…".to_string()
}

/// Outbound queue configuration
#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    /// Debounce before each batch, lets consecutive text merge
    #[serde(default = "default_merge_delay_ms")]
    pub merge_delay_ms: u64,

    /// Upper bound on the length of merged text
    #[serde(default = "default_merge_max_length")]
    pub merge_max_length: usize,

    /// Chat platform message size limit (characters)
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Attempts per delivery before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// First backoff delay, doubled on each retry
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff ceiling
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// How long shutdown waits for workers to drain
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            merge_delay_ms: default_merge_delay_ms(),
            merge_max_length: default_merge_max_length(),
            max_message_length: default_max_message_length(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl QueueConfig {
    pub fn merge_delay(&self) -> Duration {
        Duration::from_millis(self.merge_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_merge_delay_ms() -> u64 {
    500
}

fn default_merge_max_length() -> usize {
    3800
}

fn default_max_message_length() -> usize {
    4096
}

fn default_max_attempts() -> usize {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_shutdown_timeout() -> u64 {
    10
}

/// tmux adapter configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TmuxConfig {
    /// tmux session holding one window per assistant process
    #[serde(default = "default_tmux_session")]
    pub session_name: String,
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            session_name: default_tmux_session(),
        }
    }
}

fn default_tmux_session() -> String {
    "threadrelay".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
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
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.monitor.poll_interval_ms == 0 {
            return Err(Error::Config(
                "monitor.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.status.poll_interval_ms == 0 {
            return Err(Error::Config(
                "status.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.queue.max_message_length == 0 {
            return Err(Error::Config(
                "queue.max_message_length must be greater than 0".to_string(),
            ));
        }
        if self.queue.merge_max_length > self.queue.max_message_length {
            return Err(Error::Config(
                "queue.merge_max_length cannot exceed queue.max_message_length".to_string(),
            ));
        }
        if self.queue.max_attempts == 0 {
            return Err(Error::Config(
                "queue.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/threadrelay/config.toml` (~/.config/threadrelay/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("threadrelay").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/threadrelay/` (~/.local/state/threadrelay/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("threadrelay")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/threadrelay/threadrelay.log` (~/.local/state/threadrelay/threadrelay.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("threadrelay.log")
    }
}
