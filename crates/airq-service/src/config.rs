//! Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use airq_store::StoreOptions;
use airq_types::MIN_FRAME_BYTES;
use serde::{Deserialize, Serialize};

use crate::ingest::IngestOptions;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Sensor settings.
    pub sensor: SensorConfig,
    /// Query settings.
    pub query: QueryConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        // Create parent directories if needed
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// Every section is checked and all failures are reported together.
    ///
    /// # Example
    ///
    /// ```
    /// use airq_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.sensor.validate());
        errors.extend(self.query.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    /// Replace the port of the bind address, keeping the host.
    pub fn set_port(&mut self, port: u16) {
        let host = match self.bind.rsplit_once(':') {
            Some((host, _)) if !host.is_empty() => host.to_string(),
            _ => "127.0.0.1".to_string(),
        };
        self.bind = format!("{}:{}", host, port);
    }

    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
            return errors;
        }

        // Check for valid host:port format
        let Some((_, port_str)) = self.bind.rsplit_once(':') else {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            });
            return errors;
        };

        match port_str.parse::<u16>() {
            Ok(0) => errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "port cannot be 0".to_string(),
            }),
            Err(_) => errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: format!("invalid port '{}': must be a number 1-65535", port_str),
            }),
            Ok(_) => {}
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
    /// How long to wait for the database lock, in milliseconds.
    pub lock_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: airq_store::default_db_path(),
            lock_timeout_ms: airq_store::DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
        }
    }
}

impl StorageConfig {
    /// Store options derived from this section.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::default().lock_timeout(Duration::from_millis(self.lock_timeout_ms))
    }

    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        if self.lock_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "storage.lock_timeout_ms".to_string(),
                message: "lock timeout must be greater than 0".to_string(),
            });
        }

        errors
    }
}

/// Minimum poll interval in seconds.
pub const MIN_POLL_INTERVAL: u64 = 1;
/// Maximum poll interval in seconds (1 hour).
pub const MAX_POLL_INTERVAL: u64 = 3600;
/// Largest accepted read buffer.
pub const MAX_BUFFER_SIZE: usize = 4096;

/// Sensor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Serial port the sensor is attached to.
    pub port: String,
    /// Line speed.
    pub baud_rate: u32,
    /// Seconds between reads.
    pub poll_interval: u64,
    /// Seconds a single read may take before it is abandoned.
    pub read_timeout: u64,
    /// Bytes requested per read.
    pub buffer_size: usize,
    /// Drop bytes queued since the previous read before reading.
    pub discard_stale_input: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: airq_core::DEFAULT_BAUD_RATE,
            poll_interval: 30,
            read_timeout: 5,
            buffer_size: airq_types::FRAME_LEN,
            discard_stale_input: true,
        }
    }
}

impl SensorConfig {
    /// Serial options derived from this section.
    pub fn serial_options(&self) -> airq_core::SerialOptions {
        airq_core::SerialOptions {
            baud_rate: self.baud_rate,
            discard_stale_input: self.discard_stale_input,
        }
    }

    /// Loop options derived from this section.
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            poll_interval: Duration::from_secs(self.poll_interval),
            read_timeout: Duration::from_secs(self.read_timeout),
            buffer_size: self.buffer_size,
        }
    }

    /// Validate sensor configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.port.trim().is_empty() {
            errors.push(ValidationError {
                field: "sensor.port".to_string(),
                message: "serial port cannot be empty".to_string(),
            });
        }

        if self.baud_rate == 0 {
            errors.push(ValidationError {
                field: "sensor.baud_rate".to_string(),
                message: "baud rate must be greater than 0".to_string(),
            });
        }

        if self.poll_interval < MIN_POLL_INTERVAL {
            errors.push(ValidationError {
                field: "sensor.poll_interval".to_string(),
                message: format!(
                    "poll interval {} is too short (minimum {} seconds)",
                    self.poll_interval, MIN_POLL_INTERVAL
                ),
            });
        } else if self.poll_interval > MAX_POLL_INTERVAL {
            errors.push(ValidationError {
                field: "sensor.poll_interval".to_string(),
                message: format!(
                    "poll interval {} is too long (maximum {} seconds / 1 hour)",
                    self.poll_interval, MAX_POLL_INTERVAL
                ),
            });
        }

        if self.read_timeout == 0 {
            errors.push(ValidationError {
                field: "sensor.read_timeout".to_string(),
                message: "read timeout must be greater than 0".to_string(),
            });
        }

        if self.buffer_size < MIN_FRAME_BYTES || self.buffer_size > MAX_BUFFER_SIZE {
            errors.push(ValidationError {
                field: "sensor.buffer_size".to_string(),
                message: format!(
                    "buffer size {} is out of range ({}-{} bytes)",
                    self.buffer_size, MIN_FRAME_BYTES, MAX_BUFFER_SIZE
                ),
            });
        }

        errors
    }
}

/// Maximum default query window in seconds (366 days).
pub const MAX_DEFAULT_WINDOW: u64 = 366 * 24 * 60 * 60;

/// Query configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Seconds covered by a range query without a start bound.
    pub default_window: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_window: 15 * 60,
        }
    }
}

impl QueryConfig {
    /// The default window as a duration.
    pub fn default_window(&self) -> time::Duration {
        time::Duration::seconds(self.default_window.min(i64::MAX as u64) as i64)
    }

    /// Validate query configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.default_window == 0 {
            errors.push(ValidationError {
                field: "query.default_window".to_string(),
                message: "default window must be greater than 0".to_string(),
            });
        } else if self.default_window > MAX_DEFAULT_WINDOW {
            errors.push(ValidationError {
                field: "query.default_window".to_string(),
                message: format!(
                    "default window {} is too long (maximum {} seconds / 366 days)",
                    self.default_window, MAX_DEFAULT_WINDOW
                ),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `sensor.port`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
///
/// - Linux: `~/.config/airq/server.toml`
/// - macOS: `~/Library/Application Support/airq/server.toml`
/// - Windows: `C:\Users\<user>\AppData\Roaming\airq\server.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("airq")
        .join("server.toml")
}
