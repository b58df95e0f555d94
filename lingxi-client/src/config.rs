//! Configuration loading for the Lingxi client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub generation_timeout_ms: u64,
    pub session_path: PathBuf,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub chat_detail_ttl_secs: u64,
    pub plan_list_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or LINGXI_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.generation_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "generation_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.session_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "session_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.cache.chat_detail_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.chat_detail_ttl_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.plan_list_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.plan_list_ttl_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn chat_detail_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.chat_detail_ttl_secs)
    }

    pub fn plan_list_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.plan_list_ttl_secs)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("LINGXI_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
api_base_url = "http://127.0.0.1:5000"
request_timeout_ms = 30000
generation_timeout_ms = 60000
session_path = "tmp/lingxi-session.json"

[cache]
chat_detail_ttl_secs = 300
plan_list_ttl_secs = 300

[logging]
filter = "lingxi_client=debug,info"
"#;

    #[test]
    fn parses_sample_config() {
        let config = ClientConfig::from_toml(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.generation_timeout(), Duration::from_secs(60));
        assert_eq!(config.chat_detail_ttl(), Duration::from_secs(300));
        assert!(!config.logging.json);
    }

    #[test]
    fn rejects_unknown_fields() {
        let contents = format!("{SAMPLE}\nextra = 1\n");
        assert!(matches!(
            ClientConfig::from_toml(&contents),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_zero_ttl() {
        let mut config = ClientConfig::from_toml(SAMPLE).unwrap();
        config.cache.plan_list_ttl_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "cache.plan_list_ttl_secs",
                ..
            })
        ));
    }
}
