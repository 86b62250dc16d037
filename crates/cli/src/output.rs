//! Output formatting utilities

use churn_lib::models::RiskCategory;
use churn_lib::predictor::ModelPhase;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Two-column row for key/value listings
#[derive(Tabled)]
pub struct FieldRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl FieldRow {
    pub fn new(field: &str, value: impl ToString) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// Format a probability as a percentage
pub fn format_probability(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}

/// Optional metric, `-` when absent
pub fn format_optional(value: Option<f64>) -> String {
    value.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "-".to_string())
}

pub fn color_risk(risk: RiskCategory) -> String {
    match risk {
        RiskCategory::Low => risk.as_str().green().to_string(),
        RiskCategory::Medium => risk.as_str().yellow().to_string(),
        RiskCategory::High => risk.as_str().red().bold().to_string(),
    }
}

pub fn color_prediction(prediction: u8) -> String {
    if prediction == 1 {
        "churn".red().to_string()
    } else {
        "stay".green().to_string()
    }
}

pub fn color_phase(phase: ModelPhase) -> String {
    match phase {
        ModelPhase::Ready => phase.as_str().green().to_string(),
        ModelPhase::Loading | ModelPhase::NotLoaded => phase.as_str().yellow().to_string(),
        ModelPhase::LoadFailed => phase.as_str().red().to_string(),
    }
}
