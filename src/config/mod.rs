// Configuration module

mod models;

pub use models::*;

use crate::error::{ProxyError, Result};
use config::{Config, Environment, File};
use std::path::PathBuf;

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. CLI arguments (applied by the caller on top of this, highest)
    /// 2. Environment variables (`GATEWAY_*`)
    /// 3. Config file (`~/.cmm-gateway/config.toml`)
    /// 4. Defaults (lowest)
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(
                File::with_name(&Self::default_config_path())
                    .required(false)
            )
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("_")
            )
            .build()
            .map_err(|e| ProxyError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ProxyError::Config(e.to_string()))
    }

    fn default_config_path() -> String {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cmm-gateway")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}
