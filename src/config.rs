use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::services::registry::LeaseConfig;

/// 环境变量前缀，例如 `REGISTRY_PORT`
pub const ENV_PREFIX: &str = "REGISTRY_";

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "REGISTRY_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to read environment overrides: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub lease: LeaseConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
        }
    }
}

// 环境变量覆盖项
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    host: Option<String>,
    port: Option<u16>,
    lease_ttl_seconds: Option<i64>,
}

impl Config {
    /// 读取配置文件（不存在时使用默认值），再应用 `REGISTRY_*` 环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&path)?;

        let overrides: EnvOverrides = envy::prefixed(ENV_PREFIX).from_env()?;
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(config_str) => Self::from_toml(&config_str),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn from_toml(config_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(config_str)?)
    }

    fn apply(&mut self, overrides: EnvOverrides) {
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(ttl_seconds) = overrides.lease_ttl_seconds {
            self.lease.ttl_seconds = ttl_seconds;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".into()));
        }
        // TTL 为 1 秒时心跳间隔为 0，客户端不会发心跳但实例仍会被清理
        if self.lease.ttl_seconds == 1 {
            return Err(ConfigError::Invalid(
                "lease.ttl_seconds = 1 leaves no room for heartbeats; \
                 use 0 to disable expiration or at least 2"
                    .into(),
            ));
        }
        if self.lease.ttl_seconds > LeaseConfig::MAX_TTL_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "lease.ttl_seconds = {} exceeds the maximum of {}",
                self.lease.ttl_seconds,
                LeaseConfig::MAX_TTL_SECONDS
            )));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
