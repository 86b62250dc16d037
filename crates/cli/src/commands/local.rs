//! Offline commands: sample data, training and evaluation

use anyhow::{Context, Result};
use churn_lib::{
    config::ChurnConfig,
    data::{generate_sample_data, write_csv},
    model::{EvaluationMetrics, ModelType},
    training::{SearchResult, TrainingPipeline},
};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tabled::Tabled;

use crate::output::{format_optional, print_info, print_json, print_success, print_table, FieldRow, OutputFormat};

#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Hyperparameters")]
    hyperparameters: String,
    #[tabled(rename = "Mean F1")]
    mean_f1: String,
}

fn metric_rows(metrics: &EvaluationMetrics) -> Vec<FieldRow> {
    let cm = &metrics.confusion_matrix;
    vec![
        FieldRow::new("Samples", metrics.samples),
        FieldRow::new("Accuracy", format!("{:.3}", metrics.accuracy)),
        FieldRow::new("Precision", format!("{:.3}", metrics.precision)),
        FieldRow::new("Recall", format!("{:.3}", metrics.recall)),
        FieldRow::new("F1", format!("{:.3}", metrics.f1_score)),
        FieldRow::new("ROC AUC", format_optional(metrics.roc_auc)),
        FieldRow::new(
            "Confusion (TP/FP/TN/FN)",
            format!(
                "{}/{}/{}/{}",
                cm.true_positives, cm.false_positives, cm.true_negatives, cm.false_negatives
            ),
        ),
    ]
}

/// Write a synthetic labeled data set to CSV
pub fn generate(
    config: &ChurnConfig,
    rows: Option<usize>,
    seed: Option<u64>,
    output: &Path,
    format: OutputFormat,
) -> Result<()> {
    let rows = rows.unwrap_or(config.data.sample_rows);
    let seed = seed.unwrap_or(config.data.random_state);
    let records = generate_sample_data(rows, seed);
    write_csv(output, &records).with_context(|| format!("Failed to write {}", output.display()))?;

    let churners = records.iter().filter(|r| r.churn == 1).count();
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "path": output,
            "rows": rows,
            "seed": seed,
            "churners": churners,
        }))?,
        OutputFormat::Table => {
            print_success(&format!("Wrote {} customers to {}", rows, output.display()));
            print_info(&format!(
                "Churn rate: {:.1}% (seed {})",
                churners as f64 * 100.0 / rows.max(1) as f64,
                seed
            ));
        }
    }
    Ok(())
}

/// Training options taken from the command line
pub struct TrainOptions {
    pub data: Option<PathBuf>,
    pub model_type: Option<ModelType>,
    pub model_path: Option<PathBuf>,
    pub search_folds: Option<usize>,
    pub impute_missing: bool,
}

/// Train, evaluate and save a model
pub fn train(mut config: ChurnConfig, options: TrainOptions, format: OutputFormat) -> Result<()> {
    if let Some(model_type) = options.model_type {
        config.model.model_type = model_type;
    }
    if let Some(path) = options.model_path {
        config.model.path = path;
    }
    if options.impute_missing {
        config.data.impute_missing = true;
    }

    let pipeline = TrainingPipeline::new(config);
    let (report, search) = match options.search_folds {
        Some(folds) => {
            let (report, search) = pipeline
                .run_with_search(options.data.as_deref(), folds)
                .context("Training with hyperparameter search failed")?;
            (report, Some(search))
        }
        None => (
            pipeline.run(options.data.as_deref()).context("Training failed")?,
            None,
        ),
    };

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "report": report,
            "search": search,
        }))?,
        OutputFormat::Table => {
            if let Some(search) = &search {
                print_search(search)?;
            }
            println!("{}", "Training Report".bold());
            let mut rows = vec![
                FieldRow::new("Run", &report.run_id),
                FieldRow::new("Model type", report.model_type),
                FieldRow::new("Version", &report.model_version),
                FieldRow::new("Trained on", report.samples_trained),
            ];
            rows.extend(metric_rows(&report.metrics));
            print_table(rows);
            print_success(&format!("Model saved to {}", report.model_path.display()));
        }
    }
    Ok(())
}

fn print_search(search: &SearchResult) -> Result<()> {
    println!("{}", "Hyperparameter Search".bold());
    let mut rows = Vec::with_capacity(search.candidates.len());
    for (rank, candidate) in search.candidates.iter().enumerate() {
        rows.push(CandidateRow {
            rank: rank + 1,
            hyperparameters: serde_json::to_string(&candidate.hyperparameters)?,
            mean_f1: format!("{:.3}", candidate.mean_f1),
        });
    }
    print_table(rows);
    print_info(&format!("Best mean F1: {:.3}", search.best_score));
    Ok(())
}

/// Score a saved model on labeled data
pub fn evaluate(
    config: ChurnConfig,
    model: Option<PathBuf>,
    data: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let model_path = model.unwrap_or_else(|| config.model.path.clone());
    let pipeline = TrainingPipeline::new(config);
    let metrics = pipeline
        .evaluate(&model_path, data.as_deref())
        .with_context(|| format!("Failed to evaluate {}", model_path.display()))?;

    match format {
        OutputFormat::Json => print_json(&metrics)?,
        OutputFormat::Table => {
            println!("{}", format!("Evaluation of {}", model_path.display()).bold());
            print_table(metric_rows(&metrics));
        }
    }
    Ok(())
}
