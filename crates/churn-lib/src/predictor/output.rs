//! Prediction output formatting
//!
//! Turns a raw churn probability into the result returned to callers:
//! rounded probability, hard label, risk bucket, version and timestamp.

use crate::models::{PredictionResult, RiskCategory, RiskThresholds};

/// Decimal places kept in reported probabilities
pub const PROBABILITY_DECIMALS: i32 = 3;

/// Clamp to [0, 1] and round for display
pub fn round_probability(probability: f64) -> f64 {
    let scale = 10f64.powi(PROBABILITY_DECIMALS);
    (probability.clamp(0.0, 1.0) * scale).round() / scale
}

/// Formats raw model scores into prediction results
#[derive(Debug, Clone, Default)]
pub struct OutputFormatter {
    thresholds: RiskThresholds,
}

impl OutputFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// Label and bucket come from the unrounded probability; rounding is for display only
    pub fn format(
        &self,
        customer_id: Option<String>,
        probability: f64,
        decision_threshold: f64,
        model_version: &str,
    ) -> PredictionResult {
        PredictionResult {
            customer_id,
            prediction: u8::from(probability >= decision_threshold),
            churn_probability: round_probability(probability),
            risk_category: RiskCategory::from_probability(probability, &self.thresholds),
            model_version: model_version.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }
}
