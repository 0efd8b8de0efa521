use super::{
    evolution::EvolutionConfig, export::ExportConfig, oracle::OracleConfig,
    traits::ConfigSection,
};
use crate::error::DarwinError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment overrides, e.g. `DARWIN_ORACLE__PARALLEL_LIMIT=4`
pub const ENV_PREFIX: &str = "DARWIN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub evolution: EvolutionConfig,
    pub oracle: OracleConfig,
    pub export: ExportConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), DarwinError> {
        self.evolution.validate()?;
        self.oracle.validate()?;
        self.export.validate()?;
        Ok(())
    }
}

pub struct ConfigManager {
    config: AppConfig,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    /// Layers defaults, an optional TOML file and `DARWIN_*` environment
    /// variables. A bare `PARALLEL_LIMIT` is honored as well.
    pub fn load(path: Option<&Path>) -> Result<Self, DarwinError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;

        if let Ok(limit) = std::env::var("PARALLEL_LIMIT") {
            let limit = limit.trim().parse::<usize>().map_err(|e| {
                DarwinError::Configuration(format!("Invalid PARALLEL_LIMIT '{}': {}", limit, e))
            })?;
            config.oracle.parallel_limit = Some(limit);
        }

        config.validate()?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(Self { config })
    }

    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), DarwinError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DarwinError::Configuration(format!("Failed to read config: {}", e)))?;

        let config: AppConfig = toml::from_str(&contents)
            .map_err(|e| DarwinError::Configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        self.config = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), DarwinError> {
        let toml_str = toml::to_string_pretty(&self.config)
            .map_err(|e| DarwinError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path.as_ref(), toml_str)
            .map_err(|e| DarwinError::persistence(path.as_ref(), e))?;

        Ok(())
    }

    pub fn get(&self) -> AppConfig {
        self.config.clone()
    }

    pub fn update<F>(&mut self, f: F) -> Result<(), DarwinError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut candidate = self.config.clone();
        f(&mut candidate);
        candidate.validate()?;
        self.config = candidate;
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("darwin.toml");

        let mut manager = ConfigManager::new();
        manager
            .update(|c| {
                c.evolution.population_size = 12;
                c.oracle.selector = "gdax.BTC-USD".to_string();
            })
            .unwrap();
        manager.save_to_file(&path).unwrap();

        let mut reloaded = ConfigManager::new();
        reloaded.load_from_file(&path).unwrap();
        let config = reloaded.get();
        assert_eq!(config.evolution.population_size, 12);
        assert_eq!(config.oracle.selector, "gdax.BTC-USD");
        assert_eq!(config.oracle.extra_args.get("filename").map(String::as_str), Some("none"));
    }

    #[test]
    fn test_update_rejects_invalid() {
        let mut manager = ConfigManager::new();
        let result = manager.update(|c| c.evolution.population_size = 1);
        assert!(result.is_err());
        assert_eq!(manager.get().evolution.population_size, 100);
    }

    #[test]
    fn test_layered_load_reads_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[evolution]\npopulation_size = 8\n\n[oracle]\nselector = \"poloniex.ETH-BTC\"\nparallel_limit = 3\n",
        )
        .unwrap();

        let config = ConfigManager::load(Some(&path)).unwrap().get();
        assert_eq!(config.evolution.population_size, 8);
        assert_eq!(config.evolution.roi_cutoff, 5.0);
        assert_eq!(config.oracle.selector, "poloniex.ETH-BTC");
    }
}
