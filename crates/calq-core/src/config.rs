use crate::error::CoreError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "calq.toml";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Range cache behaviour
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Months kept on each side of the anchor month when pruning
    pub retention_months: u32,
    /// Tag stores built from this config stamp on the cache entries they feed
    pub source_tag: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retention_months: 3,
            source_tag: "local".to_string(),
        }
    }
}

/// Storage collaborator behaviour
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Sync metadata older than this is reported as stale
    pub stale_after_hours: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            stale_after_hours: 24,
        }
    }
}

impl StorageConfig {
    /// Staleness threshold, `None` when the hour count is negative or too
    /// large for a duration.
    pub fn stale_after(&self) -> Option<chrono::Duration> {
        if self.stale_after_hours < 0 {
            return None;
        }
        chrono::Duration::try_hours(self.stale_after_hours)
    }
}

impl Config {
    /// Defaults, then `calq.toml`, then `CALQ_` environment variables.
    pub fn load() -> Result<Self, CoreError> {
        let config: Config = Self::figment(Toml::file(CONFIG_FILE)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with one explicit TOML file and the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let config: Config = Self::figment(Toml::file(path.as_ref())).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that deserialize but cannot be used.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.storage.stale_after().is_none() {
            return Err(CoreError::InvalidInput(format!(
                "storage.stale_after_hours must be between 0 and {} hours, got {}",
                chrono::Duration::MAX.num_hours(),
                self.storage.stale_after_hours
            )));
        }
        Ok(())
    }

    fn figment(file: figment::providers::Data<Toml>) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(file)
            .merge(Env::prefixed("CALQ_").split("__"))
    }
}
