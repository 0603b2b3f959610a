//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use datalogger_core::SerialOptions;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Status broadcaster settings.
    pub broadcaster: BroadcasterConfig,
    /// Hardware driver settings.
    pub hardware: HardwareConfig,
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
    /// This checks:
    /// - Server bind address is valid (host:port format)
    /// - Subscriber buffer is not zero
    /// - Broadcast interval is within bounds (1s - 1 hour)
    /// - Download folder is not empty and serial timeouts are not zero
    ///
    /// # Example
    ///
    /// ```
    /// use datalogger_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.broadcaster.validate());
        errors.extend(self.hardware.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:5000").
    pub bind: String,
    /// Events queued per subscriber before further events are dropped for it.
    pub subscriber_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            subscriber_buffer: 64,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
        } else {
            // Check for valid host:port format
            match self.bind.rsplit_once(':') {
                None => errors.push(ValidationError {
                    field: "server.bind".to_string(),
                    message: format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                }),
                Some((_, port)) => match port.parse::<u16>() {
                    Ok(0) => errors.push(ValidationError {
                        field: "server.bind".to_string(),
                        message: "port cannot be 0".to_string(),
                    }),
                    Err(_) => errors.push(ValidationError {
                        field: "server.bind".to_string(),
                        message: format!("invalid port '{}': must be a number 1-65535", port),
                    }),
                    Ok(_) => {}
                },
            }
        }

        if self.subscriber_buffer == 0 {
            errors.push(ValidationError {
                field: "server.subscriber_buffer".to_string(),
                message: "subscriber buffer must be at least 1".to_string(),
            });
        }

        errors
    }
}

/// Minimum broadcast interval in seconds.
pub const MIN_INTERVAL_SECS: u64 = 1;
/// Maximum broadcast interval in seconds (1 hour).
pub const MAX_INTERVAL_SECS: u64 = 3600;

/// Status broadcaster configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcasterConfig {
    /// Seconds between two status polls.
    pub interval_secs: u64,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

impl BroadcasterConfig {
    /// Interval between two ticks.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validate broadcaster configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval_secs < MIN_INTERVAL_SECS {
            errors.push(ValidationError {
                field: "broadcaster.interval_secs".to_string(),
                message: format!(
                    "interval {} is too short (minimum {} second)",
                    self.interval_secs, MIN_INTERVAL_SECS
                ),
            });
        } else if self.interval_secs > MAX_INTERVAL_SECS {
            errors.push(ValidationError {
                field: "broadcaster.interval_secs".to_string(),
                message: format!(
                    "interval {} is too long (maximum {} seconds / 1 hour)",
                    self.interval_secs, MAX_INTERVAL_SECS
                ),
            });
        }

        errors
    }
}

/// Which driver talks to the hardware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Real device on a serial port.
    #[default]
    Serial,
    /// Simulated device, for demos and UI work.
    Mock,
}

/// Hardware driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Driver to use.
    pub driver: DriverKind,
    /// Folder downloads are written to until the user picks another.
    pub download_dir: PathBuf,
    /// Serial read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// A download finishes once the line is idle this long.
    pub idle_timeout_secs: u64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Serial,
            download_dir: default_download_dir(),
            read_timeout_ms: 500,
            idle_timeout_secs: 3,
        }
    }
}

impl HardwareConfig {
    /// Options for the serial driver.
    pub fn serial_options(&self) -> SerialOptions {
        SerialOptions {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            download_dir: self.download_dir.clone(),
        }
    }

    /// Validate hardware configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.download_dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "hardware.download_dir".to_string(),
                message: "download folder cannot be empty".to_string(),
            });
        }
        if self.read_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "hardware.read_timeout_ms".to_string(),
                message: "read timeout must be at least 1 ms".to_string(),
            });
        }
        if self.idle_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "hardware.idle_timeout_secs".to_string(),
                message: "idle timeout must be at least 1 second".to_string(),
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
    /// The field path (e.g., `server.bind`).
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
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("datalogger")
        .join("server.toml")
}

/// Default download folder.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("datalogger")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:5000");
        assert_eq!(config.server.subscriber_buffer, 64);
        assert_eq!(config.broadcaster.interval_secs, 5);
        assert_eq!(config.broadcaster.interval(), Duration::from_secs(5));
        assert_eq!(config.hardware.driver, DriverKind::Serial);
    }

    #[test]
    fn test_serial_options_from_hardware_config() {
        let config = HardwareConfig {
            driver: DriverKind::Serial,
            download_dir: PathBuf::from("/data/logger"),
            read_timeout_ms: 250,
            idle_timeout_secs: 10,
        };
        let options = config.serial_options();
        assert_eq!(options.read_timeout, Duration::from_millis(250));
        assert_eq!(options.idle_timeout, Duration::from_secs(10));
        assert_eq!(options.download_dir, PathBuf::from("/data/logger"));
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("server.toml");

        let config = Config {
            server: ServerConfig {
                bind: "0.0.0.0:9090".to_string(),
                subscriber_buffer: 16,
            },
            broadcaster: BroadcasterConfig { interval_secs: 2 },
            hardware: HardwareConfig {
                driver: DriverKind::Mock,
                download_dir: PathBuf::from("/tmp/downloads"),
                read_timeout_ms: 100,
                idle_timeout_secs: 1,
            },
        };

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(loaded.server.bind, "0.0.0.0:9090");
        assert_eq!(loaded.server.subscriber_buffer, 16);
        assert_eq!(loaded.broadcaster.interval_secs, 2);
        assert_eq!(loaded.hardware.driver, DriverKind::Mock);
        assert_eq!(loaded.hardware.download_dir, PathBuf::from("/tmp/downloads"));
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_config_partial_toml_uses_defaults() {
        let toml = r#"
            [broadcaster]
            interval_secs = 10

            [hardware]
            driver = "mock"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:5000");
        assert_eq!(config.broadcaster.interval_secs, 10);
        assert_eq!(config.hardware.driver, DriverKind::Mock);
        assert_eq!(config.hardware.read_timeout_ms, 500);
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("datalogger/server.toml"));
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_server_bind_validation() {
        let with_bind = |bind: &str| ServerConfig {
            bind: bind.to_string(),
            ..ServerConfig::default()
        };

        assert!(with_bind("127.0.0.1:5000").validate().is_empty());
        assert!(with_bind("[::1]:5000").validate().is_empty());
        assert!(with_bind("localhost:5000").validate().is_empty());

        let errors = with_bind("").validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty"));

        let errors = with_bind("127.0.0.1").validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("host:port"));

        let errors = with_bind("127.0.0.1:0").validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be 0"));

        let errors = with_bind("127.0.0.1:abc").validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("must be a number"));
    }

    #[test]
    fn test_subscriber_buffer_validation() {
        let config = ServerConfig {
            subscriber_buffer: 0,
            ..ServerConfig::default()
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "server.subscriber_buffer");
    }

    #[test]
    fn test_interval_validation() {
        assert!(BroadcasterConfig { interval_secs: 5 }.validate().is_empty());

        let errors = BroadcasterConfig { interval_secs: 0 }.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("too short"));

        let errors = BroadcasterConfig { interval_secs: 7200 }.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("too long"));
    }

    #[test]
    fn test_hardware_validation_collects_all_errors() {
        let config = Config {
            hardware: HardwareConfig {
                driver: DriverKind::Serial,
                download_dir: PathBuf::new(),
                read_timeout_ms: 0,
                idle_timeout_secs: 0,
            },
            ..Config::default()
        };

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 3);
                assert!(errors.iter().any(|e| e.field == "hardware.download_dir"));
                assert!(errors.iter().any(|e| e.field == "hardware.read_timeout_ms"));
                assert!(errors.iter().any(|e| e.field == "hardware.idle_timeout_secs"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let error = ConfigError::Validation(vec![
            ValidationError {
                field: "server.bind".to_string(),
                message: "port cannot be 0".to_string(),
            },
            ValidationError {
                field: "broadcaster.interval_secs".to_string(),
                message: "interval 0 is too short".to_string(),
            },
        ]);
        let display = format!("{}", error);
        assert!(display.contains("server.bind"));
        assert!(display.contains("broadcaster.interval_secs"));
    }
}
