use common::io::FileKind;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum_macros::{Display, EnumString};
use thiserror::Error;

pub const APPLICATION: &str = "stap-server";
const CONFIG_FILENAME: &str = "config.toml";

const DEFAULT_PORT: u16 = 65445;

/// When the upload handler answers the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Acknowledge {
    /// As soon as the batch is decoded. Replay continues in the background.
    Received,

    /// After every frame of the batch went through the sink.
    Replayed,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_format: String,
    pub log_level: LevelFilter,

    pub device: String,
    pub bind_address: IpAddr,
    pub port: u16,

    pub acknowledge: Acknowledge,
    /// Zero means unlimited.
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_format: common::logging::DEFAULT_FORMAT.to_string(),
            log_level: LevelFilter::Info,

            device: "dummy0".to_string(),
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,

            acknowledge: Acknowledge::Received,
            max_body_bytes: 0,
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

    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(default)]
struct ConfigDto {
    log_format: String,
    log_level: String,

    device: String,
    bind_address: String,
    port: u16,

    acknowledge: String,
    max_body_bytes: usize,
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

            device: config.device.clone(),
            bind_address: config.bind_address.to_string(),
            port: config.port,

            acknowledge: config.acknowledge.to_string(),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

impl ConfigDto {
    fn into_config(self) -> Result<Config, ConfigError> {
        let config = Config {
            log_format: self.log_format,
            log_level: LevelFilter::from_str(&self.log_level)
                .map_err(|_| ConfigError::UnknownLogLevel)?,

            device: self.device,
            bind_address: IpAddr::from_str(self.bind_address.trim())
                .map_err(|_| ConfigError::WrongBindAddress(self.bind_address.clone()))?,
            port: self.port,

            acknowledge: Acknowledge::from_str(self.acknowledge.trim())
                .map_err(|_| ConfigError::UnknownAcknowledge)?,
            max_body_bytes: self.max_body_bytes,
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

    #[error("Wrong bind address: {0}")]
    WrongBindAddress(String),

    #[error("Unknown acknowledge mode. Expected: received, replayed.")]
    UnknownAcknowledge,
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
    fn test_defaults() {
        let config = ConfigDto::default().into_config().unwrap();

        assert_eq!(config.acknowledge, Acknowledge::Received);
        assert_eq!(config.max_body_bytes, 0);
        assert_eq!(config.socket_address().to_string(), "0.0.0.0:65445");
    }

    #[test]
    fn test_partial_file() {
        let data = r#"
            device = "veth1"
            bind_address = "127.0.0.1"
            port = 9000
            acknowledge = "replayed"
            max_body_bytes = 1048576
        "#;
        let dto: ConfigDto = toml::from_str(data).unwrap();
        let config = dto.into_config().unwrap();

        assert_eq!(config.device, "veth1");
        assert_eq!(config.acknowledge, Acknowledge::Replayed);
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert_eq!(config.socket_address().to_string(), "127.0.0.1:9000");
        assert_eq!(config.log_level, LevelFilter::Info);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dto: ConfigDto = toml::from_str(r#"bind_address = "localhost:80""#).unwrap();
        assert!(matches!(
            dto.into_config(),
            Err(ConfigError::WrongBindAddress(_))
        ));

        let dto: ConfigDto = toml::from_str(r#"acknowledge = "never""#).unwrap();
        assert!(matches!(
            dto.into_config(),
            Err(ConfigError::UnknownAcknowledge)
        ));
    }
}
