//! Service and training configuration
//!
//! Layers, later wins: built-in defaults, an optional file (TOML, YAML or JSON
//! by extension), then `CHURN__SECTION__KEY` environment variables.

use crate::error::{ChurnError, Result};
use crate::model::{ForestParams, Hyperparameters, LogisticParams, ModelType};
use crate::models::RiskThresholds;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable naming a config file
pub const CONFIG_PATH_ENV: &str = "CHURN_CONFIG";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "CHURN";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// Artifact written by training and read by the server
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
    #[serde(default = "default_model_type")]
    pub model_type: ModelType,
    /// Fixed version string; derived from the training time when absent
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_decision_threshold")]
    pub decision_threshold: f64,
    #[serde(default)]
    pub logistic: LogisticParams,
    #[serde(default)]
    pub forest: ForestParams,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/churn_model.artifact")
}

fn default_model_type() -> ModelType {
    ModelType::RandomForest
}

fn default_decision_threshold() -> f64 {
    crate::model::DEFAULT_DECISION_THRESHOLD
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            model_type: default_model_type(),
            version: None,
            decision_threshold: default_decision_threshold(),
            logistic: LogisticParams::default(),
            forest: ForestParams::default(),
        }
    }
}

impl ModelSettings {
    /// Hyperparameters of the configured model type
    pub fn hyperparameters(&self) -> Hyperparameters {
        match self.model_type {
            ModelType::LogisticRegression => Hyperparameters::LogisticRegression(self.logistic.clone()),
            ModelType::RandomForest => Hyperparameters::RandomForest(self.forest.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSettings {
    /// Training CSV; synthetic data is generated when absent
    #[serde(default)]
    pub train_path: Option<PathBuf>,
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
    #[serde(default = "default_target_column")]
    pub target_column: String,
    /// Fill empty cells (median or most frequent value) instead of rejecting the row
    #[serde(default)]
    pub impute_missing: bool,
}

fn default_test_size() -> f64 {
    0.2
}

fn default_random_state() -> u64 {
    42
}

fn default_sample_rows() -> usize {
    2000
}

fn default_target_column() -> String {
    "churn".to_string()
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            train_path: None,
            test_size: default_test_size(),
            random_state: default_random_state(),
            sample_rows: default_sample_rows(),
            target_column: default_target_column(),
            impute_missing: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Full configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChurnConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub risk: RiskThresholds,
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl ChurnConfig {
    /// Load from `path` (or `CHURN_CONFIG`) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load_with_env(path.map(Path::to_path_buf).or(from_env).as_deref(), None)
    }

    /// Load with an explicit environment map in place of the process environment
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ChurnError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            builder = builder.add_source(config::File::from(path));
        }

        let config: ChurnConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let risk = &self.risk;
        if !(0.0 <= risk.low && risk.low < risk.high && risk.high <= 1.0) {
            return Err(ChurnError::Config(format!(
                "risk thresholds must satisfy 0 <= low < high <= 1, got low={} high={}",
                risk.low, risk.high
            )));
        }
        let threshold = self.model.decision_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(ChurnError::Config(format!(
                "model.decision_threshold must be in (0, 1), got {}",
                threshold
            )));
        }
        let test_size = self.data.test_size;
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(ChurnError::Config(format!(
                "data.test_size must be in (0, 1), got {}",
                test_size
            )));
        }
        if self.data.sample_rows == 0 {
            return Err(ChurnError::Config("data.sample_rows must be positive".to_string()));
        }
        if self.model.forest.n_estimators == 0 || self.model.forest.max_depth == 0 {
            return Err(ChurnError::Config(
                "model.forest needs n_estimators and max_depth above zero".to_string(),
            ));
        }
        if self.model.logistic.max_iter == 0 || self.model.logistic.learning_rate <= 0.0 {
            return Err(ChurnError::Config(
                "model.logistic needs positive max_iter and learning_rate".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MaxFeatures;
    use std::io::Write;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn write_config(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = ChurnConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.addr(), "0.0.0.0:8080");
        assert_eq!(config.model.model_type, ModelType::RandomForest);
        assert_eq!(config.model.decision_threshold, 0.5);
        assert_eq!(config.model.forest.n_estimators, 100);
        assert_eq!(config.model.logistic.max_iter, 1000);
        assert_eq!(config.risk, RiskThresholds::default());
        assert_eq!(config.data.test_size, 0.2);
        assert_eq!(config.data.target_column, "churn");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_file_then_env_override() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "churn.toml",
            r#"
[server]
port = 9000

[model]
model_type = "logistic_regression"
path = "/srv/models/churn.artifact"

[model.forest]
max_features = "log2"

[risk]
low = 0.2
high = 0.6
"#,
        );

        let config = ChurnConfig::load_with_env(
            Some(&path),
            env(&[
                ("CHURN__SERVER__PORT", "9100"),
                ("CHURN__MODEL__LOGISTIC__MAX_ITER", "50"),
                ("CHURN__LOGGING__FORMAT", "pretty"),
            ]),
        )
        .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.model.model_type, ModelType::LogisticRegression);
        assert_eq!(config.model.path, PathBuf::from("/srv/models/churn.artifact"));
        assert_eq!(config.model.forest.max_features, MaxFeatures::Log2);
        assert_eq!(config.model.logistic.max_iter, 50);
        assert_eq!(config.risk.low, 0.2);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(matches!(
            config.model.hyperparameters(),
            Hyperparameters::LogisticRegression(LogisticParams { max_iter: 50, .. })
        ));
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let result = ChurnConfig::load_with_env(
            None,
            env(&[("CHURN__RISK__LOW", "0.8"), ("CHURN__RISK__HIGH", "0.4")]),
        );
        assert!(matches!(result, Err(ChurnError::Config(_))));

        let result = ChurnConfig::load_with_env(None, env(&[("CHURN__DATA__TEST_SIZE", "1.5")]));
        assert!(matches!(result, Err(ChurnError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = ChurnConfig::load_with_env(Some(Path::new("/no/such/churn.toml")), env(&[]));
        assert!(matches!(result, Err(ChurnError::NotFound { .. })));
    }
}
