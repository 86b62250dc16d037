//! Churn classifier
//!
//! [`ChurnModel`] wraps one of two estimators behind a single interface and
//! moves from unfitted to fitted exactly once. A fitted model remembers the
//! feature names and order it was trained on and refuses any other layout.

pub mod artifact;
pub mod forest;
pub mod logistic;
pub mod metrics;

pub use artifact::ArtifactMetadata;
pub use forest::{ForestParams, MaxFeatures, RandomForest};
pub use logistic::{LogisticParams, LogisticRegression};
pub use metrics::{roc_auc, ConfusionMatrix, EvaluationMetrics};

use crate::error::{ChurnError, Result};
use crate::features::FeatureMatrix;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub const DEFAULT_DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    LogisticRegression,
    RandomForest,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::LogisticRegression => "logistic_regression",
            ModelType::RandomForest => "random_forest",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = ChurnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "logistic_regression" | "logistic" => Ok(ModelType::LogisticRegression),
            "random_forest" | "forest" => Ok(ModelType::RandomForest),
            other => Err(ChurnError::UnknownModelType(other.to_string())),
        }
    }
}

/// Hyperparameters of one estimator family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model_type", content = "params", rename_all = "snake_case")]
pub enum Hyperparameters {
    LogisticRegression(LogisticParams),
    RandomForest(ForestParams),
}

impl Hyperparameters {
    pub fn default_for(model_type: ModelType) -> Self {
        match model_type {
            ModelType::LogisticRegression => Self::LogisticRegression(LogisticParams::default()),
            ModelType::RandomForest => Self::RandomForest(ForestParams::default()),
        }
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            Self::LogisticRegression(_) => ModelType::LogisticRegression,
            Self::RandomForest(_) => ModelType::RandomForest,
        }
    }
}

/// Fitted estimator parameters, the payload of an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "estimator", rename_all = "snake_case")]
enum Estimator {
    LogisticRegression(LogisticRegression),
    RandomForest(RandomForest),
}

impl Estimator {
    fn fit(hyperparameters: &Hyperparameters, rows: &[Vec<f64>], labels: &[u8]) -> Self {
        match hyperparameters {
            Hyperparameters::LogisticRegression(p) => {
                Estimator::LogisticRegression(LogisticRegression::fit(rows, labels, p))
            }
            Hyperparameters::RandomForest(p) => {
                Estimator::RandomForest(RandomForest::fit(rows, labels, p))
            }
        }
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        match self {
            Estimator::LogisticRegression(m) => m.predict_proba(rows),
            Estimator::RandomForest(m) => m.predict_proba(rows),
        }
    }
}

#[derive(Debug, Clone)]
struct FittedModel {
    estimator: Estimator,
    feature_names: Vec<String>,
    trained_at: DateTime<Utc>,
    version: String,
    metrics: Option<EvaluationMetrics>,
}

#[derive(Debug, Clone)]
enum ModelState {
    Unfitted,
    Fitted(FittedModel),
}

/// Binary churn classifier
#[derive(Debug, Clone)]
pub struct ChurnModel {
    hyperparameters: Hyperparameters,
    decision_threshold: f64,
    version_override: Option<String>,
    state: ModelState,
}

impl ChurnModel {
    /// Unfitted model; `None` picks the family's default hyperparameters
    pub fn new(model_type: ModelType, hyperparameters: Option<Hyperparameters>) -> Result<Self> {
        let hyperparameters =
            hyperparameters.unwrap_or_else(|| Hyperparameters::default_for(model_type));
        if hyperparameters.model_type() != model_type {
            return Err(ChurnError::Config(format!(
                "{} hyperparameters given for a {} model",
                hyperparameters.model_type(),
                model_type
            )));
        }
        Ok(Self {
            hyperparameters,
            decision_threshold: DEFAULT_DECISION_THRESHOLD,
            version_override: None,
            state: ModelState::Unfitted,
        })
    }

    pub fn with_decision_threshold(mut self, threshold: f64) -> Result<Self> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(ChurnError::Config(format!(
                "decision threshold must be in (0, 1), got {}",
                threshold
            )));
        }
        self.decision_threshold = threshold;
        Ok(self)
    }

    /// Use a fixed version string instead of one derived from the fit time
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version_override = Some(version.into());
        self
    }

    pub fn model_type(&self) -> ModelType {
        self.hyperparameters.model_type()
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn decision_threshold(&self) -> f64 {
        self.decision_threshold
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self.state, ModelState::Fitted(_))
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        self.fitted().ok().map(|f| f.feature_names.as_slice())
    }

    pub fn version(&self) -> Option<&str> {
        self.fitted().ok().map(|f| f.version.as_str())
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.fitted().ok().map(|f| f.trained_at)
    }

    pub fn metrics(&self) -> Option<&EvaluationMetrics> {
        self.fitted().ok().and_then(|f| f.metrics.as_ref())
    }

    /// Attach held-out metrics so they travel with the saved artifact
    pub fn set_metrics(&mut self, metrics: EvaluationMetrics) -> Result<()> {
        match &mut self.state {
            ModelState::Fitted(fitted) => {
                fitted.metrics = Some(metrics);
                Ok(())
            }
            ModelState::Unfitted => Err(ChurnError::NotFitted),
        }
    }

    pub fn fit(&mut self, x: &FeatureMatrix, y: &[u8]) -> Result<&mut Self> {
        if self.is_fitted() {
            return Err(ChurnError::Validation("model is already fitted".to_string()));
        }
        validate_training_data(x, y)?;

        let estimator = Estimator::fit(&self.hyperparameters, &x.rows, y);
        let trained_at = Utc::now();
        let version = self.version_override.clone().unwrap_or_else(|| {
            format!(
                "{}-{}",
                self.model_type(),
                trained_at.format("%Y%m%d%H%M%S")
            )
        });

        info!(
            model_type = %self.model_type(),
            samples = x.n_rows(),
            features = x.n_features(),
            version = %version,
            "Model fitted"
        );

        self.state = ModelState::Fitted(FittedModel {
            estimator,
            feature_names: x.feature_names.clone(),
            trained_at,
            version,
            metrics: None,
        });
        Ok(self)
    }

    pub fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        let fitted = self.fitted()?;
        if x.feature_names != fitted.feature_names {
            return Err(ChurnError::FeatureMismatch {
                expected: fitted.feature_names.clone(),
                found: x.feature_names.clone(),
            });
        }
        Ok(fitted.estimator.predict_proba(&x.rows))
    }

    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| u8::from(p >= self.decision_threshold))
            .collect())
    }

    pub fn evaluate(&self, x: &FeatureMatrix, y: &[u8]) -> Result<EvaluationMetrics> {
        if x.n_rows() != y.len() {
            return Err(ChurnError::Validation(format!(
                "{} rows but {} labels",
                x.n_rows(),
                y.len()
            )));
        }
        let probabilities = self.predict_proba(x)?;
        let predicted: Vec<u8> = probabilities
            .iter()
            .map(|&p| u8::from(p >= self.decision_threshold))
            .collect();
        let metrics = EvaluationMetrics::compute(y, &predicted, &probabilities);

        info!(
            accuracy = metrics.accuracy,
            f1 = metrics.f1_score,
            roc_auc = ?metrics.roc_auc,
            samples = metrics.samples,
            "Model evaluated"
        );
        Ok(metrics)
    }

    pub fn metadata(&self) -> Result<ArtifactMetadata> {
        let fitted = self.fitted()?;
        Ok(ArtifactMetadata {
            model_type: self.model_type(),
            version: fitted.version.clone(),
            trained_at: fitted.trained_at,
            feature_names: fitted.feature_names.clone(),
            hyperparameters: self.hyperparameters.clone(),
            decision_threshold: self.decision_threshold,
            metrics: fitted.metrics.clone(),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let fitted = self.fitted()?;
        let params = serde_json::to_vec(&fitted.estimator)?;
        artifact::write(path, &self.metadata()?, &params)?;
        info!(path = %path.display(), version = %fitted.version, "Model saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (metadata, params) = artifact::read(path)?;
        let estimator: Estimator = serde_json::from_slice(&params)
            .map_err(|e| ChurnError::CorruptArtifact(format!("undecodable parameters: {}", e)))?;

        let matches_type = matches!(
            (&estimator, metadata.model_type),
            (Estimator::LogisticRegression(_), ModelType::LogisticRegression)
                | (Estimator::RandomForest(_), ModelType::RandomForest)
        );
        if !matches_type || metadata.hyperparameters.model_type() != metadata.model_type {
            return Err(ChurnError::CorruptArtifact(format!(
                "parameters do not match model type {}",
                metadata.model_type
            )));
        }

        info!(path = %path.display(), version = %metadata.version, "Model loaded");
        Ok(Self {
            hyperparameters: metadata.hyperparameters,
            decision_threshold: metadata.decision_threshold,
            version_override: None,
            state: ModelState::Fitted(FittedModel {
                estimator,
                feature_names: metadata.feature_names,
                trained_at: metadata.trained_at,
                version: metadata.version,
                metrics: metadata.metrics,
            }),
        })
    }

    fn fitted(&self) -> Result<&FittedModel> {
        match &self.state {
            ModelState::Fitted(fitted) => Ok(fitted),
            ModelState::Unfitted => Err(ChurnError::NotFitted),
        }
    }
}

fn validate_training_data(x: &FeatureMatrix, y: &[u8]) -> Result<()> {
    if x.is_empty() {
        return Err(ChurnError::Validation("no training rows".to_string()));
    }
    if x.n_features() == 0 {
        return Err(ChurnError::Validation("no feature columns".to_string()));
    }
    if x.n_rows() != y.len() {
        return Err(ChurnError::Validation(format!(
            "{} rows but {} labels",
            x.n_rows(),
            y.len()
        )));
    }
    if let Some(label) = y.iter().find(|&&l| l > 1) {
        return Err(ChurnError::Validation(format!("non-binary label {}", label)));
    }
    for (i, row) in x.rows.iter().enumerate() {
        if row.len() != x.n_features() {
            return Err(ChurnError::Validation(format!(
                "row {} has {} values, expected {}",
                i + 1,
                row.len(),
                x.n_features()
            )));
        }
        if let Some(col) = row.iter().position(|v| !v.is_finite()) {
            return Err(ChurnError::Validation(format!(
                "row {}: {} is not finite",
                i + 1,
                x.feature_names[col]
            )));
        }
    }
    Ok(())
}
