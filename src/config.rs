//! # Configuration Management
//!
//! Tuning for job calls and logging.
//!
//! Covers how returned files are stored (spooled vs. buffered), file
//! streaming chunk sizes, the response size guard, and log output.
//! Every field has a default, so a TOML file only needs the keys it changes.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - `JOBWIRE_*` environment variables via `from_env()`

use crate::core::frame::DIGEST_SIZE;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;

/// Returned files up to this size are spooled to disk; larger ones are kept in memory
pub const DEFAULT_CACHE_BYTE_LIMIT: u64 = 32 * 1024 * 1024;

/// Chunk size for streaming attached files onto the wire
pub const SEND_CHUNK_SIZE: usize = 1024;

/// Upper bound on a single read while receiving returned files
pub const RECV_CHUNK_SIZE: usize = 4096;

/// Largest response body length accepted from a job header (16 MB)
pub const MAX_BODY_LENGTH: u32 = 16 * 1024 * 1024;

const MAX_CHUNK_SIZE: usize = 1024 * 1024;
const MAX_APP_NAME_LEN: usize = 64;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct JobConfig {
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

impl JobConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProtocolError::ConfigError(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `JOBWIRE_*` environment variables.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let client = &mut config.client;

        env_override("JOBWIRE_CACHE_BYTE_LIMIT", &mut client.cache_byte_limit);
        env_override("JOBWIRE_SEND_CHUNK_SIZE", &mut client.send_chunk_size);
        env_override("JOBWIRE_RECV_CHUNK_SIZE", &mut client.recv_chunk_size);
        env_override("JOBWIRE_MAX_BODY_LENGTH", &mut client.max_body_length);
        if let Some(dir) = std::env::var_os("JOBWIRE_SPOOL_DIR").filter(|d| !d.is_empty()) {
            client.spool_dir = Some(PathBuf::from(dir));
        }
        env_override("JOBWIRE_LOG_LEVEL", &mut config.logging.level);

        config
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// TOML rendering of the defaults, as a starting point for a config file
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))
    }

    /// All problems found, empty when the configuration is usable
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.client.validate();
        errors.extend(self.logging.validate());
        errors
    }

    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_override<T: FromStr>(key: &str, slot: &mut T) {
    if let Some(value) = std::env::var(key).ok().and_then(|v| v.trim().parse().ok()) {
        *slot = value;
    }
}

/// Client-side call configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Returned files of at most this many bytes are spooled to a temporary
    /// file; larger ones are buffered in memory
    pub cache_byte_limit: u64,

    /// Directory for spooled result files (None = OS temp directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spool_dir: Option<PathBuf>,

    pub send_chunk_size: usize,

    /// Largest single read while receiving a returned file
    pub recv_chunk_size: usize,

    /// Largest body length accepted from a response header
    pub max_body_length: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache_byte_limit: DEFAULT_CACHE_BYTE_LIMIT,
            spool_dir: None,
            send_chunk_size: SEND_CHUNK_SIZE,
            recv_chunk_size: RECV_CHUNK_SIZE,
            max_body_length: MAX_BODY_LENGTH,
        }
    }
}

impl ClientConfig {
    /// Directory new spooled files are created in
    pub fn spool_dir(&self) -> PathBuf {
        self.spool_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (label, size) in [
            ("Send", self.send_chunk_size),
            ("Receive", self.recv_chunk_size),
        ] {
            if size == 0 {
                errors.push(format!("{label} chunk size must be greater than 0"));
            } else if size > MAX_CHUNK_SIZE {
                errors.push(format!(
                    "{label} chunk size too large: {size} (maximum: {MAX_CHUNK_SIZE})"
                ));
            }
        }

        if (self.max_body_length as usize) < DIGEST_SIZE {
            errors.push(format!(
                "Max body length too small: {} (minimum: {DIGEST_SIZE})",
                self.max_body_length
            ));
        }

        if let Some(dir) = &self.spool_dir {
            if !dir.is_dir() {
                errors.push(format!("Spool directory does not exist: {}", dir.display()));
            }
        }

        errors
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name attached to the first log event
    pub app_name: String,

    /// Default level; `RUST_LOG` wins when set
    #[serde(with = "level_serde")]
    pub level: Level,

    pub format: LogFormat,

    /// Append to this file instead of writing to stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("jobwire"),
            level: Level::INFO,
            format: LogFormat::Plain,
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > MAX_APP_NAME_LEN {
            errors.push(format!(
                "Application name too long: {} characters (maximum: {MAX_APP_NAME_LEN})",
                self.app_name.len()
            ));
        }

        if let Some(file) = &self.file {
            if file.is_dir() {
                errors.push(format!("Log file is a directory: {}", file.display()));
            } else if let Some(parent) = file.parent() {
                if !parent.as_os_str().is_empty() && !parent.is_dir() {
                    errors.push(format!(
                        "Log file directory does not exist: {}",
                        parent.display()
                    ));
                }
            }
        }

        errors
    }
}

/// `tracing::Level` as a lowercase string
mod level_serde {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Level, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse()
            .map_err(|_| de::Error::custom(format!("Invalid log level: {text}")))
    }
}
