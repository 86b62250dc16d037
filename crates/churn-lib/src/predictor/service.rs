//! Inference service
//!
//! Owns the one model a serving process uses. The model is loaded once,
//! stored in a `OnceLock`, and read by every request without locking; the
//! load phase is an atomic so readiness checks are lock-free too.
//!
//! Request path: validate against the record schema, transform with the
//! shared feature engineer, score, format. Every request emits one event
//! through the configured [`EventSink`].

use super::output::OutputFormatter;
use super::source::ModelSource;
use super::Predictor;
use crate::data::RecordSchema;
use crate::error::{ChurnError, InvalidInput, Result};
use crate::features::FeatureEngineer;
use crate::models::{BatchItem, CustomerRecord, ItemError, ModelInfo, PredictionResult};
use crate::observability::{fingerprint, ChurnMetrics, EventOutcome, EventSink, PredictionEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::debug;

/// Load phase of the served model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ModelPhase {
    NotLoaded = 0,
    Loading = 1,
    Ready = 2,
    /// Terminal until the process restarts
    LoadFailed = 3,
}

impl ModelPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ModelPhase::Loading,
            2 => ModelPhase::Ready,
            3 => ModelPhase::LoadFailed,
            _ => ModelPhase::NotLoaded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelPhase::NotLoaded => "not_loaded",
            ModelPhase::Loading => "loading",
            ModelPhase::Ready => "ready",
            ModelPhase::LoadFailed => "load_failed",
        }
    }
}

/// Snapshot of the service phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceState {
    pub phase: ModelPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

struct LoadedModel {
    predictor: Arc<dyn Predictor>,
    info: ModelInfo,
}

pub struct InferenceService {
    schema: RecordSchema,
    features: FeatureEngineer,
    formatter: OutputFormatter,
    sink: Arc<dyn EventSink>,
    metrics: ChurnMetrics,
    phase: AtomicU8,
    model: OnceLock<LoadedModel>,
    failure: OnceLock<String>,
}

impl InferenceService {
    pub fn new(
        features: FeatureEngineer,
        formatter: OutputFormatter,
        sink: Arc<dyn EventSink>,
        metrics: ChurnMetrics,
    ) -> Self {
        metrics.set_model_state(ModelPhase::NotLoaded as i64);
        Self {
            schema: RecordSchema::customer(),
            features,
            formatter,
            sink,
            metrics,
            phase: AtomicU8::new(ModelPhase::NotLoaded as u8),
            model: OnceLock::new(),
            failure: OnceLock::new(),
        }
    }

    pub fn phase(&self) -> ModelPhase {
        ModelPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn state(&self) -> ServiceState {
        let phase = self.phase();
        let reason = match phase {
            ModelPhase::NotLoaded => Some("model not loaded".to_string()),
            ModelPhase::Loading => Some("model is loading".to_string()),
            ModelPhase::Ready => None,
            ModelPhase::LoadFailed => Some(
                self.failure
                    .get()
                    .cloned()
                    .unwrap_or_else(|| "model load failed".to_string()),
            ),
        };
        ServiceState { phase, reason }
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == ModelPhase::Ready
    }

    /// Load the model from `source`; only the first call is accepted
    pub async fn load(&self, source: &dyn ModelSource) -> Result<ModelInfo> {
        self.phase
            .compare_exchange(
                ModelPhase::NotLoaded as u8,
                ModelPhase::Loading as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| ChurnError::AlreadyLoaded)?;
        self.metrics.set_model_state(ModelPhase::Loading as i64);
        debug!(source = %source.describe(), "Loading model");

        match self.accept(source.load().await) {
            Ok(info) => {
                self.metrics.set_model_info(&info.model_version, &info.model_type);
                self.metrics.set_model_state(ModelPhase::Ready as i64);
                Ok(info)
            }
            Err(e) => {
                // the full error can name server paths; callers get the kind only
                let _ = self.failure.set(format!("model load failed: {}", e.kind()));
                self.phase.store(ModelPhase::LoadFailed as u8, Ordering::Release);
                self.metrics.set_model_state(ModelPhase::LoadFailed as i64);
                Err(e)
            }
        }
    }

    fn accept(&self, loaded: Result<Arc<dyn Predictor>>) -> Result<ModelInfo> {
        let predictor = loaded?;
        let info = predictor.info();
        let expected = self.features.feature_names();
        if info.feature_names != expected {
            return Err(ChurnError::FeatureMismatch {
                expected,
                found: info.feature_names,
            });
        }

        let _ = self.model.set(LoadedModel {
            predictor,
            info: info.clone(),
        });
        self.phase.store(ModelPhase::Ready as u8, Ordering::Release);
        Ok(info)
    }

    fn ready_model(&self) -> Result<&LoadedModel> {
        match (self.phase(), self.model.get()) {
            (ModelPhase::Ready, Some(model)) => Ok(model),
            _ => Err(ChurnError::ServiceUnavailable(
                self.state()
                    .reason
                    .unwrap_or_else(|| "model not ready".to_string()),
            )),
        }
    }

    pub fn model_info(&self) -> Result<ModelInfo> {
        self.ready_model().map(|m| m.info.clone())
    }

    /// Score one raw JSON record
    pub fn predict(&self, input: &Value, correlation_id: &str) -> Result<PredictionResult> {
        let start = Instant::now();
        let result = self.predict_one(input);

        let outcome = match &result {
            Ok(prediction) => {
                self.metrics.inc_prediction(prediction.risk_category);
                EventOutcome::Predicted {
                    prediction: prediction.prediction,
                    risk_category: prediction.risk_category,
                }
            }
            Err(e) => {
                if matches!(e, ChurnError::InvalidInput(_)) {
                    self.metrics.inc_invalid_input();
                }
                EventOutcome::Rejected { kind: e.kind() }
            }
        };
        self.emit(input, correlation_id, outcome, start);
        result
    }

    fn predict_one(&self, input: &Value) -> Result<PredictionResult> {
        let record = self.schema.parse(input)?;
        let matrix = self.features.transform(std::slice::from_ref(&record));
        let model = self.ready_model()?;

        let probability = model
            .predictor
            .predict_proba(&matrix)?
            .first()
            .copied()
            .ok_or_else(|| ChurnError::Validation("model returned no score".to_string()))?;

        Ok(self.formatter.format(
            record.customer_id,
            probability,
            model.info.decision_threshold,
            &model.info.model_version,
        ))
    }

    /// Score many records; each item succeeds or fails on its own
    pub fn predict_batch(&self, inputs: &[Value], correlation_id: &str) -> Result<Vec<BatchItem>> {
        let start = Instant::now();
        let batch_input = Value::Array(inputs.to_vec());

        let model = match self.ready_model() {
            Ok(model) => model,
            Err(e) => {
                self.emit(&batch_input, correlation_id, EventOutcome::Rejected { kind: e.kind() }, start);
                return Err(e);
            }
        };

        let parsed: Vec<std::result::Result<CustomerRecord, InvalidInput>> =
            inputs.iter().map(|v| self.schema.parse(v)).collect();
        let valid: Vec<CustomerRecord> = parsed
            .iter()
            .filter_map(|p| p.as_ref().ok().cloned())
            .collect();

        let matrix = self.features.transform(&valid);
        let mut scores = match model.predictor.predict_proba(&matrix) {
            Ok(scores) => scores.into_iter(),
            Err(e) => {
                self.emit(&batch_input, correlation_id, EventOutcome::Rejected { kind: e.kind() }, start);
                return Err(e);
            }
        };

        let mut items = Vec::with_capacity(inputs.len());
        for (index, parsed) in parsed.into_iter().enumerate() {
            let item = match (parsed, &mut scores) {
                (Ok(record), scores) => match scores.next() {
                    Some(probability) => {
                        let prediction = self.formatter.format(
                            record.customer_id,
                            probability,
                            model.info.decision_threshold,
                            &model.info.model_version,
                        );
                        self.metrics.inc_prediction(prediction.risk_category);
                        BatchItem {
                            index,
                            prediction: Some(prediction),
                            error: None,
                        }
                    }
                    None => BatchItem {
                        index,
                        prediction: None,
                        error: Some(ItemError {
                            error: "internal_error".to_string(),
                            message: "model returned no score".to_string(),
                            fields: Vec::new(),
                        }),
                    },
                },
                (Err(invalid), _) => {
                    self.metrics.inc_invalid_input();
                    BatchItem {
                        index,
                        prediction: None,
                        error: Some(ItemError {
                            error: "invalid_input".to_string(),
                            message: invalid.to_string(),
                            fields: invalid.fields,
                        }),
                    }
                }
            };
            items.push(item);
        }

        let succeeded = items.iter().filter(|i| i.is_ok()).count();
        self.emit(
            &batch_input,
            correlation_id,
            EventOutcome::Batch {
                succeeded,
                failed: items.len() - succeeded,
            },
            start,
        );
        Ok(items)
    }

    fn emit(&self, input: &Value, correlation_id: &str, outcome: EventOutcome, start: Instant) {
        let elapsed = start.elapsed();
        self.metrics.observe_prediction_latency(elapsed.as_secs_f64());
        self.sink.log(&PredictionEvent {
            correlation_id: correlation_id.to_string(),
            input_fingerprint: fingerprint(input),
            outcome,
            latency_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        });
    }
}
