//! Error types shared across the churn library

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ChurnError>;

/// A single schema violation on an input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Every field that failed validation for one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidInput {
    pub fields: Vec<FieldError>,
}

impl InvalidInput {
    pub fn new(fields: Vec<FieldError>) -> Self {
        Self { fields }
    }

    /// Names of the offending fields, in report order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.field.as_str()).collect()
    }
}

impl fmt::Display for InvalidInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|e| format!("{}: {}", e.field, e.reason))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Canonical error type for the churn library
#[derive(Debug, Error)]
pub enum ChurnError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid input: {0}")]
    InvalidInput(InvalidInput),

    #[error("model must be fitted before prediction")]
    NotFitted,

    #[error("feature mismatch: model expects {expected:?}, got {found:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("model already loaded or loading")]
    AlreadyLoaded,

    #[error("incompatible artifact format version {found}, expected {expected}")]
    IncompatibleArtifact { found: u32, expected: u32 },

    #[error("corrupt artifact: {0}")]
    CorruptArtifact(String),

    #[error("unknown model type: {0}")]
    UnknownModelType(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChurnError {
    /// Short machine-readable name, used in logs and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            ChurnError::NotFound { .. } => "not_found",
            ChurnError::Validation(_) => "validation",
            ChurnError::InvalidInput(_) => "invalid_input",
            ChurnError::NotFitted => "not_fitted",
            ChurnError::FeatureMismatch { .. } => "feature_mismatch",
            ChurnError::ServiceUnavailable(_) => "service_unavailable",
            ChurnError::AlreadyLoaded => "already_loaded",
            ChurnError::IncompatibleArtifact { .. } => "incompatible_artifact",
            ChurnError::CorruptArtifact(_) => "corrupt_artifact",
            ChurnError::UnknownModelType(_) => "unknown_model_type",
            ChurnError::Config(_) => "config",
            ChurnError::Io(_) => "io",
            ChurnError::Csv(_) => "csv",
            ChurnError::Json(_) => "json",
        }
    }

    /// True for errors the caller can fix by correcting its input
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChurnError::InvalidInput(_) | ChurnError::Validation(_))
    }
}

impl From<InvalidInput> for ChurnError {
    fn from(value: InvalidInput) -> Self {
        ChurnError::InvalidInput(value)
    }
}

impl From<config::ConfigError> for ChurnError {
    fn from(value: config::ConfigError) -> Self {
        ChurnError::Config(value.to_string())
    }
}
