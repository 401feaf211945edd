//! Configuration management for Dropline.
//!
//! This module handles loading, saving, and validating Dropline configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/dropline/config.toml` |
//! | macOS | `~/Library/Application Support/com.dropline.Dropline/config.toml` |
//! | Windows | `%APPDATA%\dropline\Dropline\config\config.toml` |
//!
//! ## Precedence
//!
//! Environment variables override the file, which overrides built-in
//! defaults. Durations read from the environment are in milliseconds.
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `DROPLINE_PORT` | `network.port` |
//! | `DROPLINE_CONNECT_TIMEOUT` | `network.connect_timeout` |
//! | `DROPLINE_READ_TIMEOUT` | `network.read_timeout` |
//! | `DROPLINE_BUFFER_SIZE` | `transfer.buffer_size` |
//! | `DROPLINE_MAX_FILE_SIZE` | `transfer.max_file_size` |
//! | `DROPLINE_STORAGE_DIR` | `transfer.storage_dir` |
//! | `DROPLINE_USERNAME` | `general.username` |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transfer::{ReceiverConfig, SenderConfig};

/// Main configuration struct for Dropline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Network settings
    pub network: NetworkConfig,
    /// Transfer settings
    pub transfer: TransferConfig,
    /// History settings
    pub history: HistoryConfig,
}

/// General configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Username announced to peers
    pub username: String,
    /// Local user owning transfer records
    pub user_id: i64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            username: hostname::get().map_or_else(
                |_| "dropline".to_string(),
                |h| h.to_string_lossy().to_string(),
            ),
            user_id: 1,
        }
    }
}

/// Network configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Listening port, and default port when dialing
    pub port: u16,
    /// Interface address the receiver binds to
    pub bind_address: IpAddr,
    /// Bound on establishing a connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Bound on each read from a peer
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            connect_timeout: crate::DEFAULT_CONNECT_TIMEOUT,
            read_timeout: crate::DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunk size for streaming file bytes
    pub buffer_size: usize,
    /// Largest file accepted or sent (None for unlimited)
    pub max_file_size: Option<u64>,
    /// Directory where received files land
    pub storage_dir: PathBuf,
    /// Upper bound on simultaneous receptions (None for unbounded)
    pub max_concurrent: Option<usize>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            buffer_size: crate::DEFAULT_BUFFER_SIZE,
            max_file_size: Some(crate::DEFAULT_MAX_FILE_SIZE),
            storage_dir: PathBuf::from(crate::DEFAULT_STORAGE_DIR),
            max_concurrent: None,
        }
    }
}

/// History configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Enable transfer history
    pub enabled: bool,
    /// Maximum history entries
    pub max_entries: usize,
    /// Auto-clear history after days (None = never)
    pub auto_clear_days: Option<u32>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 100,
            auto_clear_days: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location, then apply
    /// environment overrides.
    ///
    /// If the configuration file doesn't exist, the defaults are used.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from `path` without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "dropline", "Dropline")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Apply `DROPLINE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply `DROPLINE_*` overrides using `lookup` to read variables.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = parse_env(&lookup, "DROPLINE_PORT") {
            self.network.port = port;
        }
        if let Some(ms) = parse_env(&lookup, "DROPLINE_CONNECT_TIMEOUT") {
            self.network.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env(&lookup, "DROPLINE_READ_TIMEOUT") {
            self.network.read_timeout = Duration::from_millis(ms);
        }
        if let Some(size) = parse_env(&lookup, "DROPLINE_BUFFER_SIZE") {
            self.transfer.buffer_size = size;
        }
        if let Some(size) = parse_env(&lookup, "DROPLINE_MAX_FILE_SIZE") {
            self.transfer.max_file_size = Some(size);
        }
        if let Some(dir) = lookup("DROPLINE_STORAGE_DIR").filter(|v| !v.trim().is_empty()) {
            self.transfer.storage_dir = PathBuf::from(dir);
        }
        if let Some(name) = lookup("DROPLINE_USERNAME").filter(|v| !v.trim().is_empty()) {
            self.general.username = name;
        }
    }

    /// Check values that would make the endpoints unusable.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.transfer.buffer_size == 0 {
            return Err(invalid("transfer.buffer_size", "must be greater than zero"));
        }
        if self.network.connect_timeout.is_zero() {
            return Err(invalid("network.connect_timeout", "must be greater than zero"));
        }
        if self.network.read_timeout.is_zero() {
            return Err(invalid("network.read_timeout", "must be greater than zero"));
        }
        if self.transfer.storage_dir.as_os_str().is_empty() {
            return Err(invalid("transfer.storage_dir", "must not be empty"));
        }
        if self.history.max_entries == 0 {
            return Err(invalid("history.max_entries", "must be greater than zero"));
        }
        Ok(())
    }

    /// Settings for the sending endpoint.
    #[must_use]
    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            connect_timeout: self.network.connect_timeout,
            read_timeout: self.network.read_timeout,
            buffer_size: self.transfer.buffer_size,
            max_file_size: self.transfer.max_file_size,
            username: self.general.username.clone(),
        }
    }

    /// Settings for the receiving endpoint.
    #[must_use]
    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            bind_addr: SocketAddr::new(self.network.bind_address, self.network.port),
            storage_dir: self.transfer.storage_dir.clone(),
            read_timeout: self.network.read_timeout,
            buffer_size: self.transfer.buffer_size,
            max_file_size: self.transfer.max_file_size,
            max_concurrent: self.transfer.max_concurrent,
            user_id: self.general.user_id,
        }
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

fn invalid(key: &str, reason: &str) -> Error {
    Error::InvalidConfig {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.strip_suffix("ms")
            .map(|ms| {
                ms.parse()
                    .map(Duration::from_millis)
                    .map_err(serde::de::Error::custom)
            })
            .or_else(|| {
                s.strip_suffix('s').map(|secs| {
                    secs.parse()
                        .map(Duration::from_secs)
                        .map_err(serde::de::Error::custom)
                })
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map(|m| Duration::from_secs(m * 60))
                        .map_err(serde::de::Error::custom)
                })
            })
            .unwrap_or_else(|| Err(serde::de::Error::custom("invalid duration format")))
    }
}
