//! Where a serving process gets its model from

use super::Predictor;
use crate::error::{ChurnError, Result};
use crate::model::ChurnModel;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Produces the predictor a service will serve
#[async_trait]
pub trait ModelSource: Send + Sync {
    /// Human-readable origin, used in logs
    fn describe(&self) -> String;

    async fn load(&self) -> Result<Arc<dyn Predictor>>;
}

/// Reads a model artifact from disk on a blocking thread
#[derive(Debug, Clone)]
pub struct FsModelSource {
    path: PathBuf,
}

impl FsModelSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ModelSource for FsModelSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<Arc<dyn Predictor>> {
        let path = self.path.clone();
        debug!(path = %path.display(), "Reading model artifact");
        let model = tokio::task::spawn_blocking(move || ChurnModel::load(&path))
            .await
            .map_err(|e| ChurnError::ServiceUnavailable(format!("model load task failed: {}", e)))??;
        Ok(Arc::new(model))
    }
}

/// Hands over a predictor that already lives in memory
#[derive(Clone)]
pub struct StaticModelSource {
    predictor: Arc<dyn Predictor>,
}

impl StaticModelSource {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        Self { predictor }
    }
}

#[async_trait]
impl ModelSource for StaticModelSource {
    fn describe(&self) -> String {
        format!("in-memory model {}", self.predictor.info().model_version)
    }

    async fn load(&self) -> Result<Arc<dyn Predictor>> {
        Ok(Arc::clone(&self.predictor))
    }
}
