//! Customer churn prediction library
//!
//! This crate provides the core functionality for:
//! - Loading and validating customer data
//! - Feature engineering shared by training and serving
//! - Logistic regression and random forest churn models with a checksummed artifact format
//! - Offline training and hyperparameter search
//! - The inference service behind the HTTP API
//! - Health checks, configuration and observability

pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod health;
pub mod model;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod training;

pub use config::ChurnConfig;
pub use error::{ChurnError, FieldError, InvalidInput, Result};
pub use features::{FeatureEngineer, FeatureMatrix, FEATURE_NAMES};
pub use health::{HealthResponse, ReadinessResponse};
pub use model::{ChurnModel, EvaluationMetrics, Hyperparameters, ModelType};
pub use models::*;
pub use observability::{ChurnMetrics, EventSink, StructuredLogger};
pub use predictor::{InferenceService, ModelPhase, ModelSource, Predictor};
pub use training::{TrainingPipeline, TrainingReport};
