//! Churn API - online churn prediction service
//!
//! Serves predictions from a trained model artifact over HTTP. The model is
//! loaded in the background so liveness answers while loading is in progress.

use anyhow::{Context, Result};
use churn_api::{api, AppState};
use churn_lib::{
    config::{ChurnConfig, LogFormat, LoggingSettings},
    features::FeatureEngineer,
    observability::{ChurnMetrics, StructuredLogger},
    predictor::{FsModelSource, InferenceService, ModelSource, OutputFormatter},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_tracing(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));
    let registry = tracing_subscriber::registry().with(filter);

    match settings.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ChurnConfig::load(None).context("failed to load configuration")?;
    init_tracing(&config.logging);

    info!(
        model_path = %config.model.path.display(),
        risk_low = config.risk.low,
        risk_high = config.risk.high,
        "Starting churn-api"
    );

    let metrics = ChurnMetrics::new();
    let logger = Arc::new(StructuredLogger::new("churn-api"));

    let service = Arc::new(InferenceService::new(
        FeatureEngineer::new(),
        OutputFormatter::with_thresholds(config.risk.clone()),
        logger.clone(),
        metrics.clone(),
    ));

    // Load the model in the background; /ready reports the outcome
    let source = FsModelSource::new(&config.model.path);
    let loader = {
        let service = Arc::clone(&service);
        let logger = Arc::clone(&logger);
        tokio::spawn(async move {
            match service.load(&source).await {
                Ok(info) => logger.log_model_loaded(&info, &source.describe()),
                Err(e) => logger.log_model_load_failed(&e.to_string(), &source.describe()),
            }
        })
    };

    let state = Arc::new(AppState::new(service, metrics, SERVICE_VERSION));
    let addr = config.server.addr();
    logger.log_startup(SERVICE_VERSION, &addr);

    api::serve(&addr, state, shutdown_signal())
        .await
        .with_context(|| format!("API server on {} failed", addr))?;

    loader.abort();
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}
