//! Liveness and readiness reporting
//!
//! Liveness only says the process is up; readiness follows the model load
//! phase of the inference service.

use crate::predictor::{ModelPhase, ServiceState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATUS_HEALTHY: &str = "healthy";

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub model_state: ModelPhase,
    pub version: String,
}

impl HealthResponse {
    /// The process answers, so it is healthy whatever the model phase
    pub fn from_state(state: &ServiceState, version: impl Into<String>) -> Self {
        Self {
            status: STATUS_HEALTHY.to_string(),
            timestamp: Utc::now(),
            model_state: state.phase,
            version: version.into(),
        }
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReadinessResponse {
    pub fn from_state(state: &ServiceState) -> Self {
        match state.phase {
            ModelPhase::Ready => Self {
                ready: true,
                reason: None,
            },
            _ => Self {
                ready: false,
                reason: Some(
                    state
                        .reason
                        .clone()
                        .unwrap_or_else(|| state.phase.as_str().to_string()),
                ),
            },
        }
    }
}
