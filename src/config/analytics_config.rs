//! Analytics configuration loaded from TOML
//!
//! All sections are optional; anything omitted takes its built-in default.
//!
//! ```toml
//! [model]
//! backend = "file"            # file | sled | memory
//! path = "data/anomaly_model.json"
//! n_estimators = 100
//! contamination = 0.1
//!
//! [features]
//! rolling_window = 10
//!
//! [prediction]
//! trend_window = 20
//!
//! [thresholds.defaults.temperature]
//! min = -10.0
//! max = 85.0
//!
//! [thresholds.machines."press-01".vibration]
//! min = 0.0
//! max = 30.0
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::ml_engine::{
    DetectorParams, FileModelStore, InMemoryModelStore, ModelStore, SledModelStore, StorageError,
};
use crate::processing::PredictorSettings;
use crate::thresholds::ThresholdStore;
use crate::types::{default_rules, SensorRules};

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "MACHINE_HEALTH_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "machine_health.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub model: ModelSection,
    pub features: FeaturesSection,
    pub prediction: PredictorSettings,
    pub thresholds: ThresholdsSection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Sled,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub backend: StoreBackend,
    /// JSON file for `file`, database directory for `sled`, unused for `memory`
    pub path: PathBuf,
    pub n_estimators: usize,
    pub contamination: f64,
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: PathBuf::from(defaults::DEFAULT_MODEL_PATH),
            n_estimators: defaults::DEFAULT_N_ESTIMATORS,
            contamination: defaults::DEFAULT_CONTAMINATION,
            max_samples: defaults::DEFAULT_MAX_SAMPLES,
            seed: defaults::DEFAULT_SEED,
        }
    }
}

impl ModelSection {
    pub fn detector_params(&self) -> DetectorParams {
        DetectorParams {
            n_estimators: self.n_estimators,
            contamination: self.contamination,
            max_samples: self.max_samples,
            seed: self.seed,
        }
    }

    /// Open the configured model store.
    pub fn open_store(&self) -> Result<Arc<dyn ModelStore>, StorageError> {
        Ok(match self.backend {
            StoreBackend::File => Arc::new(FileModelStore::new(&self.path)),
            StoreBackend::Sled => Arc::new(SledModelStore::open(&self.path)?),
            StoreBackend::Memory => Arc::new(InMemoryModelStore::new()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesSection {
    pub rolling_window: usize,
}

impl Default for FeaturesSection {
    fn default() -> Self {
        Self {
            rolling_window: defaults::DEFAULT_ROLLING_WINDOW,
        }
    }
}

/// Threshold rules loaded at startup.
///
/// `defaults` entries override the built-in rule for their sensor type only.
/// A `machines` entry replaces that machine's whole rule map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsSection {
    pub defaults: SensorRules,
    pub machines: BTreeMap<String, SensorRules>,
}

impl ThresholdsSection {
    /// Built-in default rules with configured entries applied on top.
    pub fn effective_defaults(&self) -> SensorRules {
        let mut rules = default_rules();
        rules.extend(self.defaults.iter().map(|(k, v)| (k.clone(), *v)));
        rules
    }

    /// A store holding the effective defaults and every machine override.
    pub fn build_store(&self) -> ThresholdStore {
        let store = ThresholdStore::with_defaults(self.effective_defaults());
        self.apply_machine_overrides(&store);
        store
    }

    pub fn apply_machine_overrides(&self, store: &ThresholdStore) {
        for (machine_id, rules) in &self.machines {
            store.set_rules(machine_id.clone(), rules.clone());
        }
    }
}

impl AnalyticsConfig {
    /// Load configuration using the standard search order:
    ///
    /// 1. `$MACHINE_HEALTH_CONFIG` environment variable
    /// 2. `./machine_health.toml`
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        for w in super::validation::validate_unknown_keys(&contents) {
            warn!(path = %path.display(), "{}", w);
        }

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Check every value for internal consistency, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let m = &self.model;
        if m.n_estimators == 0 {
            errors.push("model.n_estimators must be > 0".to_string());
        }
        if m.max_samples == 0 {
            errors.push("model.max_samples must be > 0".to_string());
        }
        if !(m.contamination > 0.0 && m.contamination <= 0.5) {
            errors.push(format!(
                "model.contamination ({}) must be in (0, 0.5]",
                m.contamination
            ));
        }

        if self.features.rolling_window == 0 {
            errors.push("features.rolling_window must be > 0".to_string());
        }

        let p = &self.prediction;
        for (name, value) in [
            ("prediction.min_timesteps", p.min_timesteps),
            ("prediction.trend_window", p.trend_window),
            ("prediction.anomaly_window", p.anomaly_window),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be > 0"));
            }
        }

        Self::check_rules("thresholds.defaults", &self.thresholds.defaults, &mut errors);
        for (machine_id, rules) in &self.thresholds.machines {
            Self::check_rules(&format!("thresholds.machines.{machine_id}"), rules, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_rules(prefix: &str, rules: &SensorRules, errors: &mut Vec<String>) {
        for (sensor_type, bounds) in rules {
            if !bounds.min.is_finite() || !bounds.max.is_finite() {
                errors.push(format!("{prefix}.{sensor_type}: bounds must be finite"));
            } else if bounds.min >= bounds.max {
                errors.push(format!(
                    "{prefix}.{sensor_type}: min ({}) must be less than max ({})",
                    bounds.min, bounds.max
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SensorType, ThresholdBounds};

    #[test]
    fn test_defaults_validate() {
        let config = AnalyticsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.n_estimators, 100);
        assert_eq!(config.prediction.trend_window, 20);
        assert_eq!(config.features.rolling_window, 10);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AnalyticsConfig = toml::from_str(
            r#"
            [model]
            backend = "sled"
            contamination = 0.05

            [thresholds.defaults."Motor Temp"]
            min = -5.0
            max = 85.0

            [thresholds.machines."press-01".vibration]
            min = 0.0
            max = 30.0
            "#,
        )
        .unwrap();

        assert_eq!(config.model.backend, StoreBackend::Sled);
        assert_eq!(config.model.contamination, 0.05);
        assert_eq!(config.model.n_estimators, 100);

        let defaults = config.thresholds.effective_defaults();
        assert_eq!(defaults[&SensorType::Temperature], ThresholdBounds::new(-5.0, 85.0));
        assert_eq!(defaults[&SensorType::Vibration].max, 50.0);

        let store = config.thresholds.build_store();
        assert_eq!(store.rules_for("press-01").len(), 1);
        assert_eq!(store.rules_for("press-01")[&SensorType::Vibration].max, 30.0);
        assert_eq!(store.rules_for("other")[&SensorType::Temperature].max, 85.0);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = AnalyticsConfig::default();
        config.model.contamination = 0.7;
        config.model.n_estimators = 0;
        config.thresholds.machines.insert(
            "m1".to_string(),
            SensorRules::from([(SensorType::Tension, ThresholdBounds::new(10.0, 5.0))]),
        );

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 3, "{errors:?}");
                assert!(errors.iter().any(|e| e.contains("thresholds.machines.m1.tension")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_backend_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[model]\nbackend = \"postgres\"\n").unwrap();
        assert!(matches!(
            AnalyticsConfig::load_from_file(&path),
            Err(ConfigError::Parse(_, _))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine_health.toml");

        let mut config = AnalyticsConfig::default();
        config.model.seed = 7;
        config.thresholds.machines.insert(
            "press-02".to_string(),
            SensorRules::from([(SensorType::Humidity, ThresholdBounds::new(10.0, 90.0))]),
        );
        config.save_to_file(&path).unwrap();

        let loaded = AnalyticsConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_memory_backend_opens() {
        let section = ModelSection {
            backend: StoreBackend::Memory,
            ..ModelSection::default()
        };
        let store = section.open_store().unwrap();
        assert_eq!(store.backend_name(), "InMemory");
    }
}
