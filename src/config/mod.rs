use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{Result, ScraperError};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Marketplace variant: "mercari" or "mercari_jp".
    pub marketplace: String,
    pub headless: bool,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConcurrencyConfig {
    /// Upper bound on simultaneous detail-page fetches. 0 means "use the
    /// marketplace variant's default".
    pub max_concurrent_details: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    /// Deadline for a page's readiness signal.
    pub page_ready_ms: u64,
    /// Deadline for a single detail-field extraction.
    pub field_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub directory: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            marketplace: "mercari".to_string(),
            headless: true,
            concurrency: ConcurrencyConfig {
                max_concurrent_details: 0,
            },
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 500,
                max_backoff_ms: 10_000,
            },
            timeouts: TimeoutConfig {
                page_ready_ms: 30_000,
                field_ms: 1_000,
            },
            cache: CacheConfig {
                directory: PathBuf::from("./detail_cache"),
            },
        }
    }
}

pub struct FileConfigManager {
    config_path: PathBuf,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn load_config(&self) -> Result<Config> {
        info!("Loading configuration from {:?}", self.config_path);

        if !self.config_path.exists() {
            warn!(
                "Configuration file not found, creating default config at {:?}",
                self.config_path
            );
            self.create_default_config()?;
        }

        let config_content = fs::read_to_string(&self.config_path)
            .map_err(|e| ScraperError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_content)
            .map_err(|e| ScraperError::Config(format!("Failed to parse TOML config: {}", e)))?;

        self.validate_config(&config)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| ScraperError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, toml_content)
            .map_err(|e| ScraperError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved to {:?}", self.config_path);
        Ok(())
    }

    pub fn validate_config(&self, config: &Config) -> Result<()> {
        debug!("Validating configuration");

        if !matches!(config.marketplace.as_str(), "mercari" | "mercari_jp") {
            return Err(ScraperError::Config(format!(
                "unknown marketplace '{}', expected 'mercari' or 'mercari_jp'",
                config.marketplace
            )));
        }

        if config.concurrency.max_concurrent_details > 50 {
            return Err(ScraperError::Config(
                "max_concurrent_details cannot exceed 50 for resource safety".to_string(),
            ));
        }

        if config.retry.max_attempts == 0 {
            return Err(ScraperError::Config(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if config.retry.max_attempts > 10 {
            return Err(ScraperError::Config(
                "max_attempts cannot exceed 10".to_string(),
            ));
        }
        if config.retry.initial_delay_ms > config.retry.max_backoff_ms {
            return Err(ScraperError::Config(
                "initial_delay_ms must not exceed max_backoff_ms".to_string(),
            ));
        }

        if config.timeouts.page_ready_ms == 0 || config.timeouts.field_ms == 0 {
            return Err(ScraperError::Config(
                "timeouts must be greater than 0".to_string(),
            ));
        }
        // per-field deadlines must be strictly tighter than the page deadline
        if config.timeouts.field_ms >= config.timeouts.page_ready_ms {
            return Err(ScraperError::Config(
                "field_ms must be less than page_ready_ms".to_string(),
            ));
        }

        if config.cache.directory.as_os_str().is_empty() {
            return Err(ScraperError::Config(
                "cache directory cannot be empty".to_string(),
            ));
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    fn create_default_config(&self) -> Result<()> {
        let default_config = Config::default();

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ScraperError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        self.save_config(&default_config)?;
        info!("Default configuration file created at {:?}", self.config_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let manager = FileConfigManager::new(config_path.clone());

        let config = manager.load_config().unwrap();

        assert_eq!(config.marketplace, "mercari");
        assert!(config.headless);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config_path.exists());
    }

    #[test]
    fn test_config_validation() {
        let manager = FileConfigManager::new(PathBuf::from("test.toml"));

        let valid_config = Config::default();
        assert!(manager.validate_config(&valid_config).is_ok());

        let mut invalid_config = Config::default();
        invalid_config.marketplace = "ebay".to_string();
        assert!(manager.validate_config(&invalid_config).is_err());

        let mut invalid_config = Config::default();
        invalid_config.retry.max_attempts = 0;
        assert!(manager.validate_config(&invalid_config).is_err());

        // field timeout must stay below the page-ready timeout
        let mut invalid_config = Config::default();
        invalid_config.timeouts.field_ms = invalid_config.timeouts.page_ready_ms;
        assert!(manager.validate_config(&invalid_config).is_err());
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let manager = FileConfigManager::new(config_path);

        let mut config = Config::default();
        config.marketplace = "mercari_jp".to_string();
        config.concurrency.max_concurrent_details = 3;
        manager.save_config(&config).unwrap();

        let reloaded = manager.load_config().unwrap();
        assert_eq!(reloaded.marketplace, "mercari_jp");
        assert_eq!(reloaded.concurrency.max_concurrent_details, 3);
    }
}
