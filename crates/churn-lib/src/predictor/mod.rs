//! Online churn prediction

mod output;
mod service;
mod source;

pub use output::{round_probability, OutputFormatter, PROBABILITY_DECIMALS};
pub use service::{InferenceService, ModelPhase, ServiceState};
pub use source::{FsModelSource, ModelSource, StaticModelSource};

use crate::error::Result;
use crate::features::FeatureMatrix;
use crate::model::ChurnModel;
use crate::models::ModelInfo;

/// Scoring backend behind the inference service
pub trait Predictor: Send + Sync {
    /// Churn probability per row
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;

    /// Version, type and feature layout of the loaded model
    fn info(&self) -> ModelInfo;
}

impl Predictor for ChurnModel {
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        ChurnModel::predict_proba(self, features)
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            model_version: self.version().unwrap_or("unfitted").to_string(),
            model_type: self.model_type().to_string(),
            feature_names: self.feature_names().map(<[String]>::to_vec).unwrap_or_default(),
            trained_at: self.trained_at(),
            decision_threshold: self.decision_threshold(),
            metrics: self.metrics().cloned(),
        }
    }
}
