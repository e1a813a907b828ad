use crate::queue::OverflowPolicy;
use common::io::FileKind;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const APPLICATION: &str = "stap-client";
const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_format: String,
    pub log_level: LevelFilter,
    pub log_to_file: bool,

    pub device: String,
    pub snapshot_length: u32,
    pub promiscuous: bool,
    pub read_timeout_ms: i32,

    pub server_host: String,
    pub server_port: u16,

    pub batch_window_seconds: u64,
    pub frame_queue_capacity: usize,
    pub upload_queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub upload_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_format: common::logging::DEFAULT_FORMAT.to_string(),
            log_level: LevelFilter::Info,
            log_to_file: false,

            device: "eth0".to_string(),
            snapshot_length: common::container::DEFAULT_SNAPSHOT_LENGTH,
            promiscuous: true,
            read_timeout_ms: 500,

            server_host: "192.168.1.1".to_string(),
            server_port: 65445,

            batch_window_seconds: 10,
            frame_queue_capacity: 65536,
            upload_queue_capacity: 4,
            overflow_policy: OverflowPolicy::Block,
            upload_retries: 0,
            retry_backoff_ms: 500,
        }
    }
}

impl Config {
    pub fn from_file() -> Result<Self, ConfigError> {
        let path = Self::get_config_path()?;
        match fs::read_to_string(&path) {
            Ok(data) => {
                let dto: ConfigDto = toml::from_str(&data)
                    .map_err(ConfigError::TomlDeserializationError)?;
                dto.into_config()
            },
            Err(_) => {
                let config = Config::default();
                config.save_to_file(&path)?;
                Ok(config)
            },
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let data = toml::to_string(&ConfigDto::from(self))
            .map_err(ConfigError::TomlSerializationError)?;

        common::io::create_parent_directories(path).map_err(ConfigError::IOError)?;
        fs::write(path, data).map_err(ConfigError::IOError)?;

        Ok(())
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        match common::io::path_from_args() {
            Some(path) => Ok(path),
            None => common::io::get_storage_file_path(
                APPLICATION,
                CONFIG_FILENAME,
                FileKind::Config,
            )
            .map_err(ConfigError::IOError),
        }
    }

    pub fn server_url(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.server_host,
            self.server_port,
            common::envelope::UPLOAD_PATH
        )
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_secs(self.batch_window_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(default)]
struct ConfigDto {
    log_format: String,
    log_level: String,
    log_to_file: bool,

    device: String,
    snapshot_length: u32,
    promiscuous: bool,
    read_timeout_ms: i32,

    server_host: String,
    server_port: u16,

    batch_window_seconds: u64,
    frame_queue_capacity: usize,
    upload_queue_capacity: usize,
    overflow_policy: String,
    upload_retries: u32,
    retry_backoff_ms: u64,
}

impl Default for ConfigDto {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ConfigDto {
    fn from(config: &Config) -> Self {
        Self {
            log_format: config.log_format.clone(),
            log_level: config.log_level.to_string(),
            log_to_file: config.log_to_file,

            device: config.device.clone(),
            snapshot_length: config.snapshot_length,
            promiscuous: config.promiscuous,
            read_timeout_ms: config.read_timeout_ms,

            server_host: config.server_host.clone(),
            server_port: config.server_port,

            batch_window_seconds: config.batch_window_seconds,
            frame_queue_capacity: config.frame_queue_capacity,
            upload_queue_capacity: config.upload_queue_capacity,
            overflow_policy: config.overflow_policy.to_string(),
            upload_retries: config.upload_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }
}

impl ConfigDto {
    fn into_config(self) -> Result<Config, ConfigError> {
        if self.batch_window_seconds == 0 {
            return Err(ConfigError::ZeroBatchWindow);
        }
        if self.frame_queue_capacity == 0 {
            return Err(ConfigError::ZeroFrameQueue);
        }
        if i32::try_from(self.snapshot_length).is_err() {
            return Err(ConfigError::SnapshotLengthTooLarge);
        }

        let config = Config {
            log_format: self.log_format,
            log_level: LevelFilter::from_str(&self.log_level)
                .map_err(|_| ConfigError::UnknownLogLevel)?,
            log_to_file: self.log_to_file,

            device: self.device,
            snapshot_length: self.snapshot_length,
            promiscuous: self.promiscuous,
            read_timeout_ms: self.read_timeout_ms,

            server_host: self.server_host,
            server_port: self.server_port,

            batch_window_seconds: self.batch_window_seconds,
            frame_queue_capacity: self.frame_queue_capacity,
            upload_queue_capacity: self.upload_queue_capacity,
            overflow_policy: OverflowPolicy::from_str(self.overflow_policy.trim())
                .map_err(|_| ConfigError::UnknownOverflowPolicy)?,
            upload_retries: self.upload_retries,
            retry_backoff_ms: self.retry_backoff_ms,
        };

        Ok(config)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO Error.")]
    IOError(#[from] std::io::Error),

    #[error("TOML Serialization Error.")]
    TomlSerializationError(#[from] toml::ser::Error),

    #[error("TOML Deserialization Error.")]
    TomlDeserializationError(#[from] toml::de::Error),

    #[error("Unknown log level.")]
    UnknownLogLevel,

    #[error("Unknown overflow policy. Expected: block, drop-newest, drop-oldest.")]
    UnknownOverflowPolicy,

    #[error("Batch window must be at least one second.")]
    ZeroBatchWindow,

    #[error("Frame queue capacity must be positive.")]
    ZeroFrameQueue,

    #[error("Snapshot length is too large.")]
    SnapshotLengthTooLarge,
}

impl ConfigError {
    pub fn additional_info(&self) -> Option<String> {
        match self {
            ConfigError::IOError(err) => Some(err.to_string()),
            ConfigError::TomlSerializationError(err) => Some(err.to_string()),
            ConfigError::TomlDeserializationError(err) => Some(err.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_survives_toml() {
        let data = toml::to_string(&ConfigDto::from(&Config::default())).unwrap();
        let dto: ConfigDto = toml::from_str(&data).unwrap();
        let config = dto.into_config().unwrap();

        assert_eq!(config.log_level, LevelFilter::Info);
        assert_eq!(config.overflow_policy, OverflowPolicy::Block);
        assert_eq!(config.batch_window(), Duration::from_secs(10));
        assert_eq!(config.server_url(), "http://192.168.1.1:65445/upload");
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let data = r#"
            device = "wlan0"
            server_host = "10.0.0.7"
            overflow_policy = "drop-oldest"
            log_level = "debug"
        "#;
        let dto: ConfigDto = toml::from_str(data).unwrap();
        let config = dto.into_config().unwrap();

        assert_eq!(config.device, "wlan0");
        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.server_port, 65445);
        assert_eq!(config.upload_retries, 0);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dto: ConfigDto = toml::from_str(r#"overflow_policy = "drop-everything""#).unwrap();
        assert!(matches!(
            dto.into_config(),
            Err(ConfigError::UnknownOverflowPolicy)
        ));

        let dto: ConfigDto = toml::from_str("batch_window_seconds = 0").unwrap();
        assert!(matches!(dto.into_config(), Err(ConfigError::ZeroBatchWindow)));

        let dto: ConfigDto = toml::from_str(r#"log_level = "loud""#).unwrap();
        assert!(matches!(dto.into_config(), Err(ConfigError::UnknownLogLevel)));
    }
}
