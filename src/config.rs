use crate::error::{ExchangeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sweeper: SweeperConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
    pub busy_timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct SweeperConfig {
    pub interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://tradepost.db".to_string(),
            // Single writer connection; conflicting trades serialize here.
            max_connections: Some(1),
            busy_timeout_seconds: Some(30),
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| ExchangeError::Config(format!("Failed to read config file: {e}")))?;

        let config: AppConfig = toml::from_str(&config_str)
            .map_err(|e| ExchangeError::Config(format!("Failed to parse config file: {e}")))?;

        Ok(config)
    }

    pub fn load_with_env_overrides<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("TRADEPOST_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(interval) = std::env::var("TRADEPOST_SWEEP_INTERVAL_SECONDS") {
            if let Ok(seconds) = interval.parse() {
                self.sweeper.interval_seconds = seconds;
            }
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(ExchangeError::Config(
                "Database URL cannot be empty".to_string(),
            ));
        }
        if self.database.max_connections == Some(0) {
            return Err(ExchangeError::Config(
                "Database pool needs at least one connection".to_string(),
            ));
        }
        if self.sweeper.interval_seconds == 0 {
            return Err(ExchangeError::Config(
                "Sweep interval cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn create_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let default_config = AppConfig::default();
    let toml_str = toml::to_string_pretty(&default_config)
        .map_err(|e| ExchangeError::Config(format!("Failed to serialize default config: {e}")))?;

    std::fs::write(path, toml_str)
        .map_err(|e| ExchangeError::Config(format!("Failed to write default config file: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.max_connections, Some(1));
        assert_eq!(config.sweeper.interval_seconds, 60);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.sweeper.interval_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.url.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_round_trip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        create_default_config_file(path).unwrap();
        let loaded = AppConfig::load(path).unwrap();
        assert_eq!(loaded.database.url, "sqlite://tradepost.db");
    }

    #[test]
    fn test_partial_config_parses() {
        let config: AppConfig = toml::from_str(
            r#"
            [database]
            url = "sqlite://test.db"

            [sweeper]
            interval_seconds = 5

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.sweeper.interval_seconds, 5);
        assert_eq!(config.database.max_connections, None);
        assert_eq!(config.logging.level, "debug");
    }
}
