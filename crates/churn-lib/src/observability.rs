//! Observability for the churn service
//!
//! Provides:
//! - Prometheus metrics (request counts, prediction latency, risk mix, model info)
//! - The [`EventSink`] seam for per-request prediction events
//! - [`StructuredLogger`], which writes named events through tracing

use crate::error::Result;
use crate::model::EvaluationMetrics;
use crate::models::{ModelInfo, RiskCategory};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for prediction latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ChurnMetricsInner> = OnceLock::new();

struct ChurnMetricsInner {
    requests_total: IntCounterVec,
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounterVec,
    invalid_inputs_total: IntCounter,
    model_info: GaugeVec,
    model_state: IntGauge,
}

impl ChurnMetricsInner {
    fn new() -> Self {
        Self {
            requests_total: register_int_counter_vec!(
                "churn_api_requests_total",
                "HTTP requests by endpoint and status code",
                &["endpoint", "status"]
            )
            .expect("Failed to register requests_total"),

            prediction_latency_seconds: register_histogram!(
                "churn_api_prediction_latency_seconds",
                "Time spent validating, transforming and scoring a request",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "churn_api_predictions_total",
                "Predictions served by risk category",
                &["risk_category"]
            )
            .expect("Failed to register predictions_total"),

            invalid_inputs_total: register_int_counter!(
                "churn_api_invalid_inputs_total",
                "Inputs rejected by schema validation"
            )
            .expect("Failed to register invalid_inputs_total"),

            model_info: register_gauge_vec!(
                "churn_api_model_info",
                "Information about the loaded model",
                &["version", "model_type"]
            )
            .expect("Failed to register model_info"),

            model_state: register_int_gauge!(
                "churn_api_model_state",
                "Model load state: 0 not loaded, 1 loading, 2 ready, 3 load failed"
            )
            .expect("Failed to register model_state"),
        }
    }
}

/// Handle to the process-wide churn metrics; clones share the same series
#[derive(Clone)]
pub struct ChurnMetrics {
    _private: (),
}

impl Default for ChurnMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ChurnMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ChurnMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ChurnMetricsInner {
        GLOBAL_METRICS.get_or_init(ChurnMetricsInner::new)
    }

    pub fn record_request(&self, endpoint: &str, status: u16) {
        self.inner()
            .requests_total
            .with_label_values(&[endpoint, &status.to_string()])
            .inc();
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_prediction(&self, risk: RiskCategory) {
        self.inner()
            .predictions_total
            .with_label_values(&[risk.as_str()])
            .inc();
    }

    pub fn inc_invalid_input(&self) {
        self.inner().invalid_inputs_total.inc();
    }

    pub fn set_model_info(&self, version: &str, model_type: &str) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[version, model_type])
            .set(1.0);
    }

    pub fn set_model_state(&self, code: i64) {
        self.inner().model_state.set(code);
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| crate::error::ChurnError::Config(format!("metrics encoding: {}", e)))?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// How a prediction request ended
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Predicted {
        prediction: u8,
        risk_category: RiskCategory,
    },
    Batch {
        succeeded: usize,
        failed: usize,
    },
    /// Rejected or failed, with the error kind
    Rejected { kind: &'static str },
}

impl EventOutcome {
    pub fn label(&self) -> String {
        match self {
            EventOutcome::Predicted {
                prediction,
                risk_category,
            } => format!("prediction={} risk={}", prediction, risk_category.as_str()),
            EventOutcome::Batch { succeeded, failed } => {
                format!("batch succeeded={} failed={}", succeeded, failed)
            }
            EventOutcome::Rejected { kind } => format!("error={}", kind),
        }
    }
}

/// One structured record per prediction request
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionEvent {
    pub correlation_id: String,
    /// First 16 hex chars of the SHA-256 of the canonical JSON input
    pub input_fingerprint: String,
    pub outcome: EventOutcome,
    pub latency_us: u64,
}

/// Destination for prediction events
pub trait EventSink: Send + Sync {
    fn log(&self, event: &PredictionEvent);
}

/// Stable short hash of a JSON input; object keys are serialized in sorted order
pub fn fingerprint(input: &Value) -> String {
    let canonical = input.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Structured logger for service events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, addr: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            service_version = %version,
            addr = %addr,
            "Churn prediction service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Churn prediction service shutting down"
        );
    }

    pub fn log_model_loaded(&self, info: &ModelInfo, source: &str) {
        info!(
            event = "model_loaded",
            service = %self.service,
            model_version = %info.model_version,
            model_type = %info.model_type,
            features = info.feature_names.len(),
            source = %source,
            "Model loaded and serving"
        );
    }

    pub fn log_model_load_failed(&self, reason: &str, source: &str) {
        warn!(
            event = "model_load_failed",
            service = %self.service,
            reason = %reason,
            source = %source,
            "Model failed to load, service stays unready"
        );
    }

    pub fn log_training_completed(
        &self,
        run_id: &str,
        model_version: &str,
        model_path: &str,
        metrics: &EvaluationMetrics,
    ) {
        info!(
            event = "training_completed",
            service = %self.service,
            run_id = %run_id,
            model_version = %model_version,
            model_path = %model_path,
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1_score,
            roc_auc = ?metrics.roc_auc,
            "Training run completed"
        );
    }
}

impl EventSink for StructuredLogger {
    fn log(&self, event: &PredictionEvent) {
        match &event.outcome {
            EventOutcome::Rejected { kind } => {
                warn!(
                    event = "prediction_rejected",
                    service = %self.service,
                    correlation_id = %event.correlation_id,
                    input_fingerprint = %event.input_fingerprint,
                    error_kind = %kind,
                    latency_us = event.latency_us,
                    "Prediction request rejected"
                );
            }
            outcome => {
                info!(
                    event = "prediction_served",
                    service = %self.service,
                    correlation_id = %event.correlation_id,
                    input_fingerprint = %event.input_fingerprint,
                    outcome = %outcome.label(),
                    latency_us = event.latency_us,
                    "Prediction served"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_churn_metrics_creation() {
        let metrics = ChurnMetrics::new();
        metrics.record_request("/predict", 200);
        metrics.observe_prediction_latency(0.0004);
        metrics.inc_prediction(RiskCategory::High);
        metrics.inc_invalid_input();
        metrics.set_model_info("v1", "random_forest");
        metrics.set_model_state(2);

        let text = metrics.render().unwrap();
        assert!(text.contains("churn_api_requests_total"));
        assert!(text.contains("churn_api_model_info"));
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = json!({"tenure_months": 12, "contract_type": "One year"});
        let b = json!({"contract_type": "One year", "tenure_months": 12});
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 16);
        assert_ne!(fingerprint(&a), fingerprint(&json!({"tenure_months": 13})));
    }

    #[test]
    fn test_outcome_labels() {
        let served = EventOutcome::Predicted {
            prediction: 1,
            risk_category: RiskCategory::High,
        };
        assert_eq!(served.label(), "prediction=1 risk=High");
        assert_eq!(
            EventOutcome::Rejected { kind: "invalid_input" }.label(),
            "error=invalid_input"
        );
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("churn-api");
        assert_eq!(logger.service, "churn-api");
        logger.log(&PredictionEvent {
            correlation_id: "req-1".to_string(),
            input_fingerprint: "0123456789abcdef".to_string(),
            outcome: EventOutcome::Batch {
                succeeded: 2,
                failed: 1,
            },
            latency_us: 120,
        });
    }
}
