//! Commands that query a running churn API

use anyhow::{bail, Context, Result};
use churn_lib::models::{BatchResponse, PredictionResult};
use colored::Colorize;
use serde_json::Value;
use std::path::Path;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_phase, color_prediction, color_risk, format_probability, print_info, print_json,
    print_table, print_warning, FieldRow, OutputFormat,
};

/// Row for prediction tables
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Customer")]
    customer: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Probability")]
    probability: String,
    #[tabled(rename = "Risk")]
    risk: String,
}

impl PredictionRow {
    fn from_prediction(index: usize, result: &PredictionResult) -> Self {
        Self {
            index,
            customer: result.customer_id.clone().unwrap_or_else(|| "-".to_string()),
            outcome: color_prediction(result.prediction),
            probability: format_probability(result.churn_probability),
            risk: color_risk(result.risk_category),
        }
    }
}

/// Read a JSON document from `--json` or a file
pub fn read_input(json: Option<&str>, file: Option<&Path>) -> Result<Value> {
    let text = match (json, file) {
        (Some(json), _) => json.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => bail!("Provide a customer as a file or with --json"),
    };
    serde_json::from_str(&text).context("Input is not valid JSON")
}

/// Accept either a bare array or an object with a `customers` array
pub fn batch_customers(input: Value) -> Result<Vec<Value>> {
    match input {
        Value::Array(customers) => Ok(customers),
        Value::Object(mut map) => match map.remove("customers") {
            Some(Value::Array(customers)) => Ok(customers),
            _ => bail!("Expected a \"customers\" array"),
        },
        _ => bail!("Expected a JSON array of customers"),
    }
}

pub async fn predict(client: &ApiClient, customer: Value, format: OutputFormat) -> Result<()> {
    let result = client.predict(&customer).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            print_table(vec![PredictionRow::from_prediction(0, &result)]);
            print_info(&format!("Model {}", result.model_version));
        }
    }
    Ok(())
}

pub async fn batch(client: &ApiClient, customers: Vec<Value>, format: OutputFormat) -> Result<()> {
    if customers.is_empty() {
        bail!("No customers to score");
    }
    let response: BatchResponse = client.predict_batch(customers).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            let rows: Vec<PredictionRow> = response
                .results
                .iter()
                .filter_map(|item| {
                    item.prediction
                        .as_ref()
                        .map(|p| PredictionRow::from_prediction(item.index, p))
                })
                .collect();
            print_table(rows);

            for item in response.results.iter().filter(|i| !i.is_ok()) {
                if let Some(error) = &item.error {
                    print_warning(&format!("Item {}: {}", item.index, error.message));
                }
            }
            println!(
                "\nTotal: {}  Succeeded: {}  Failed: {}  Predicted churners: {}",
                response.total,
                response.succeeded.to_string().green(),
                response.failed.to_string().red(),
                response.predicted_churners
            );
        }
    }
    Ok(())
}

pub async fn info(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let info = client.model_info().await?;

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            let trained_at = info
                .trained_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string());
            let mut rows = vec![
                FieldRow::new("Version", &info.model_version),
                FieldRow::new("Type", &info.model_type),
                FieldRow::new("Trained at", trained_at),
                FieldRow::new("Decision threshold", info.decision_threshold),
                FieldRow::new("Features", info.feature_names.len()),
            ];
            if let Some(metrics) = &info.metrics {
                rows.push(FieldRow::new("Test F1", format!("{:.3}", metrics.f1_score)));
            }
            print_table(rows);
            println!("{} {}", "Features:".bold(), info.feature_names.join(", "));
        }
    }
    Ok(())
}

pub async fn status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.ready().await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        }))?,
        OutputFormat::Table => {
            println!("{} {}", "Service:".bold(), client.base_url());
            let mut rows = vec![
                FieldRow::new("Status", health.status.green()),
                FieldRow::new("Version", &health.version),
                FieldRow::new("Model", color_phase(health.model_state)),
                FieldRow::new("Ready", readiness.ready),
            ];
            if let Some(reason) = &readiness.reason {
                rows.push(FieldRow::new("Reason", reason));
            }
            print_table(rows);
        }
    }
    Ok(())
}
