//! Tuning knobs for the engine.
//!
//! Every value has a default that matches the shipped behaviour, so an empty
//! or missing `config.toml` is valid. Only the fields being tuned need to be
//! present:
//!
//! ```toml
//! [priority.weights]
//! struggle = 0.5
//!
//! [sampler]
//! diversity_penalty = 0.6
//!
//! [sessions]
//! max_age_days = 2
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

const APP_DIR: &str = "drill";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_DB_NAME: &str = "drill.db";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub priority: PriorityConfig,
    pub sampler: SamplerConfig,
    pub feedback: FeedbackConfig,
    pub sessions: SessionConfig,
    pub storage: StorageConfig,
}

/// Relative importance of each priority sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub struggle: f64,
    pub due: f64,
    pub base: f64,
    pub novelty: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            struggle: 0.40,
            due: 0.30,
            base: 0.15,
            novelty: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    pub weights: PriorityWeights,
    /// Topics younger than this get a linearly decaying novelty boost.
    pub novelty_window_days: f64,
    /// Shortest re-exposure interval before success and difficulty stretch it.
    pub base_interval_days: f64,
    /// Priority floor so every topic stays sampleable.
    pub epsilon: f64,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            weights: PriorityWeights::default(),
            novelty_window_days: 14.0,
            base_interval_days: 3.0,
            epsilon: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Multiplier applied to same-category weights after each pick.
    pub diversity_penalty: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            diversity_penalty: 0.70,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Fraction of the gap to the target score that `base_score` moves per rating.
    pub adjustment_ratio: f64,
    pub easy_score: f64,
    pub medium_score: f64,
    pub hard_score: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            adjustment_ratio: 0.10,
            easy_score: 20.0,
            medium_score: 50.0,
            hard_score: 80.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions older than this are discarded instead of resolved.
    pub max_age_days: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { max_age_days: 7.0 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite file or JSON data directory; derived from the platform config dir when unset.
    pub path: Option<PathBuf>,
}

impl EngineConfig {
    /// Load from `$DRILL_CONFIG`, falling back to `<config_dir>/drill/config.toml`.
    /// A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&raw)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.priority.weights;
        let weights = [w.struggle, w.due, w.base, w.novelty];
        if weights.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(invalid("priority weights must be finite and non-negative"));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(invalid("at least one priority weight must be positive"));
        }
        if self.priority.novelty_window_days <= 0.0 {
            return Err(invalid("novelty_window_days must be positive"));
        }
        if self.priority.base_interval_days <= 0.0 {
            return Err(invalid("base_interval_days must be positive"));
        }
        if self.priority.epsilon.is_nan() || self.priority.epsilon <= 0.0 {
            return Err(invalid("epsilon must be positive"));
        }

        let penalty = self.sampler.diversity_penalty;
        if penalty.is_nan() || penalty <= 0.0 || penalty > 1.0 {
            return Err(invalid("diversity_penalty must be in (0, 1]"));
        }

        let fb = &self.feedback;
        if !(0.0..=1.0).contains(&fb.adjustment_ratio) {
            return Err(invalid("adjustment_ratio must be in [0, 1]"));
        }
        for score in [fb.easy_score, fb.medium_score, fb.hard_score] {
            if !(1.0..=100.0).contains(&score) {
                return Err(invalid("difficulty target scores must be in [1, 100]"));
            }
        }

        let max_age = self.sessions.max_age_days;
        if !max_age.is_finite() || max_age <= 0.0 {
            return Err(invalid("max_age_days must be positive"));
        }

        Ok(())
    }

    /// SQLite path: `$DRILL_DB`, then the configured path, then the platform default.
    pub fn sqlite_path(&self) -> PathBuf {
        if let Ok(path) = std::env::var("DRILL_DB") {
            return PathBuf::from(path);
        }
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| app_dir().join(DEFAULT_DB_NAME))
    }

    /// JSON data directory: `$DRILL_DATA_DIR`, then the configured path, then the platform default.
    pub fn data_dir(&self) -> PathBuf {
        if let Ok(path) = std::env::var("DRILL_DATA_DIR") {
            return PathBuf::from(path);
        }
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| app_dir().join("data"))
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

fn app_dir() -> PathBuf {
    let dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&dir).ok();
    dir
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("DRILL_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod defaults_tests {
        use super::*;

        #[test]
        fn default_weights_sum_to_one() {
            let w = PriorityWeights::default();
            let sum = w.struggle + w.due + w.base + w.novelty;
            assert!((sum - 1.0).abs() < 1e-12);
        }

        #[test]
        fn default_config_is_valid() {
            assert!(EngineConfig::default().validate().is_ok());
        }

        #[test]
        fn default_feedback_targets() {
            let fb = FeedbackConfig::default();
            assert_eq!(fb.easy_score, 20.0);
            assert_eq!(fb.medium_score, 50.0);
            assert_eq!(fb.hard_score, 80.0);
            assert_eq!(fb.adjustment_ratio, 0.10);
        }
    }

    mod toml_tests {
        use super::*;

        #[test]
        fn empty_toml_yields_defaults() {
            let config = EngineConfig::from_toml("").unwrap();
            assert_eq!(config, EngineConfig::default());
        }

        #[test]
        fn partial_override_keeps_other_defaults() {
            let config = EngineConfig::from_toml(
                r#"
                [priority.weights]
                struggle = 0.5

                [sampler]
                diversity_penalty = 0.5
                "#,
            )
            .unwrap();

            assert_eq!(config.priority.weights.struggle, 0.5);
            assert_eq!(config.priority.weights.due, 0.30);
            assert_eq!(config.priority.novelty_window_days, 14.0);
            assert_eq!(config.sampler.diversity_penalty, 0.5);
        }

        #[test]
        fn storage_backend_parses_lowercase() {
            let config = EngineConfig::from_toml(
                r#"
                [storage]
                backend = "json"
                path = "/tmp/drill-data"
                "#,
            )
            .unwrap();
            assert_eq!(config.storage.backend, StorageBackend::Json);
            assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/drill-data")));
        }

        #[test]
        fn session_age_override() {
            let config = EngineConfig::from_toml("[sessions]\nmax_age_days = 1.5\n").unwrap();
            assert_eq!(config.sessions.max_age_days, 1.5);
            assert_eq!(EngineConfig::default().sessions.max_age_days, 7.0);
        }

        #[test]
        fn malformed_toml_is_parse_error() {
            let result = EngineConfig::from_toml("[priority\nweights = ");
            assert!(matches!(result, Err(ConfigError::Parse(_))));
        }

        #[test]
        fn from_file_reads_disk() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("config.toml");
            std::fs::write(&path, "[feedback]\nadjustment_ratio = 0.2\n").unwrap();

            let config = EngineConfig::from_file(&path).unwrap();
            assert_eq!(config.feedback.adjustment_ratio, 0.2);
        }
    }

    mod validation_tests {
        use super::*;

        #[test]
        fn rejects_negative_weight() {
            let mut config = EngineConfig::default();
            config.priority.weights.due = -0.1;
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }

        #[test]
        fn rejects_all_zero_weights() {
            let mut config = EngineConfig::default();
            config.priority.weights = PriorityWeights {
                struggle: 0.0,
                due: 0.0,
                base: 0.0,
                novelty: 0.0,
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn rejects_penalty_out_of_range() {
            let mut config = EngineConfig::default();
            config.sampler.diversity_penalty = 0.0;
            assert!(config.validate().is_err());
            config.sampler.diversity_penalty = 1.5;
            assert!(config.validate().is_err());
            config.sampler.diversity_penalty = 1.0;
            assert!(config.validate().is_ok());
        }

        #[test]
        fn rejects_target_outside_score_range() {
            let mut config = EngineConfig::default();
            config.feedback.hard_score = 120.0;
            assert!(config.validate().is_err());
        }

        #[test]
        fn rejects_non_positive_session_age() {
            let mut config = EngineConfig::default();
            config.sessions.max_age_days = 0.0;
            assert!(config.validate().is_err());
            config.sessions.max_age_days = f64::NAN;
            assert!(config.validate().is_err());
        }

        #[test]
        fn rejects_non_positive_interval() {
            let mut config = EngineConfig::default();
            config.priority.base_interval_days = 0.0;
            assert!(config.validate().is_err());
        }
    }
}
