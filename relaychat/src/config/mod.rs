//! Configuration system for the `relaychat` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/relaychat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT};
use crate::connection::{
    ConnectionSettings, DEFAULT_CONNECT_TIMEOUT, DEFAULT_EVENT_BUFFER,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY, DEFAULT_RELAY_URL,
};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A server address is not a usable URL.
    #[error("invalid {field} {value:?}: {reason}")]
    InvalidUrl {
        /// Which setting was wrong.
        field: &'static str,
        /// The offending value.
        value: String,
        /// What is wrong with it.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    network: NetworkFileConfig,
    chat: ChatFileConfig,
}

/// `[network]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    relay_url: Option<String>,
    api_url: Option<String>,
    connect_timeout_secs: Option<u64>,
    reconnect_delay_secs: Option<u64>,
    max_reconnect_attempts: Option<u32>,
    event_buffer: Option<usize>,
    request_timeout_secs: Option<u64>,
}

/// `[chat]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    username: Option<String>,
    peer: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    // -- Network --
    /// Relay WebSocket URL.
    pub relay_url: String,
    /// REST API base URL.
    pub api_url: String,
    /// How long to wait for the relay socket to open.
    pub connect_timeout: Duration,
    /// Pause before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Reconnect attempts between two successful opens.
    pub max_reconnect_attempts: u32,
    /// Capacity of the connection notification channel.
    pub event_buffer: usize,
    /// Timeout for each REST request.
    pub request_timeout: Duration,

    // -- Chat --
    /// Local user.
    pub username: Option<String>,
    /// Peer to chat with.
    pub peer: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            event_buffer: DEFAULT_EVENT_BUFFER,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            username: None,
            peer: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or if a resolved server address is not a valid URL.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        config.validate()?;
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            relay_url: cli
                .relay_url
                .clone()
                .or_else(|| file.network.relay_url.clone())
                .unwrap_or(defaults.relay_url),
            api_url: cli
                .api_url
                .clone()
                .or_else(|| file.network.api_url.clone())
                .unwrap_or(defaults.api_url),
            connect_timeout: file
                .network
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            reconnect_delay: file
                .network
                .reconnect_delay_secs
                .map_or(defaults.reconnect_delay, Duration::from_secs),
            max_reconnect_attempts: file
                .network
                .max_reconnect_attempts
                .unwrap_or(defaults.max_reconnect_attempts),
            event_buffer: file
                .network
                .event_buffer
                .unwrap_or(defaults.event_buffer),
            request_timeout: file
                .network
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            username: cli
                .username
                .clone()
                .or_else(|| file.chat.username.clone()),
            peer: cli.peer.clone().or_else(|| file.chat.peer.clone()),
        }
    }

    /// Check that both server addresses parse and use a fitting scheme.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] naming the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("relay_url", &self.relay_url, &["ws", "wss"])?;
        check_url("api_url", &self.api_url, &["http", "https"])
    }

    /// Settings for a relay session built from this configuration.
    #[must_use]
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            relay_url: self.relay_url.clone(),
            connect_timeout: self.connect_timeout,
            reconnect_delay: self.reconnect_delay,
            max_reconnect_attempts: self.max_reconnect_attempts,
            event_buffer: self.event_buffer,
        }
    }
}

/// CLI arguments parsed by clap.
///
/// `WEBSOCKET_SERVER` and `SERVER` are the variable names the chat server
/// deployment already uses.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Relay-backed chat client")]
pub struct CliArgs {
    /// WebSocket URL of the chat relay.
    #[arg(long, env = "WEBSOCKET_SERVER")]
    pub relay_url: Option<String>,

    /// Base URL of the chat server REST API.
    #[arg(long, env = "SERVER")]
    pub api_url: Option<String>,

    /// Your username.
    #[arg(short, long, env = "RELAYCHAT_USER")]
    pub username: Option<String>,

    /// User to chat with.
    #[arg(short, long, env = "RELAYCHAT_PEER")]
    pub peer: Option<String>,

    /// Log in with this password before chatting.
    #[arg(long, env = "RELAYCHAT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Create the account first (requires `--password`).
    #[arg(long, requires = "password")]
    pub register: bool,

    /// Change your username to this one before chatting.
    #[arg(long, value_name = "NEW_USERNAME")]
    pub rename: Option<String>,

    /// Change your password to this one (requires `--password`).
    #[arg(long, requires = "password", env = "RELAYCHAT_NEW_PASSWORD", hide_env_values = true)]
    pub new_password: Option<String>,

    /// Print your conversations and exit.
    #[arg(long)]
    pub list_chats: bool,

    /// Path to config file (default: `~/.config/relaychat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RELAYCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/relaychat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn check_url(field: &'static str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };
    let parsed = url::Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(invalid(format!(
            "scheme must be one of {}",
            schemes.join(", ")
        )));
    }
    Ok(())
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("relaychat").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
