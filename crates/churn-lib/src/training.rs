//! Offline training pipeline
//!
//! load (or generate) → validate → parse → transform → stratified split →
//! fit → evaluate → save. Cross-validated hyperparameter search lives here too.

use crate::config::ChurnConfig;
use crate::data::{self, stratified_folds, stratified_split, RecordSchema};
use crate::error::{ChurnError, Result};
use crate::features::{FeatureEngineer, FeatureMatrix};
use crate::model::{
    ChurnModel, EvaluationMetrics, ForestParams, Hyperparameters, LogisticParams, ModelType,
};
use crate::models::LabeledRecord;
use crate::observability::StructuredLogger;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Summary of one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub run_id: String,
    pub model_path: PathBuf,
    pub model_version: String,
    pub model_type: ModelType,
    pub metrics: EvaluationMetrics,
    pub samples_trained: usize,
    pub samples_tested: usize,
}

/// Cross-validated score of one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub hyperparameters: Hyperparameters,
    pub mean_f1: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub best: Hyperparameters,
    pub best_score: f64,
    pub candidates: Vec<CandidateScore>,
}

pub struct TrainingPipeline {
    config: ChurnConfig,
    features: FeatureEngineer,
    logger: StructuredLogger,
}

impl TrainingPipeline {
    pub fn new(config: ChurnConfig) -> Self {
        Self {
            config,
            features: FeatureEngineer::new(),
            logger: StructuredLogger::new("churn-training"),
        }
    }

    pub fn config(&self) -> &ChurnConfig {
        &self.config
    }

    /// Train on `data_path` (or the configured path, or synthetic data) and save the model
    pub fn run(&self, data_path: Option<&Path>) -> Result<TrainingReport> {
        self.execute(data_path, None).map(|(report, _)| report)
    }

    /// Like [`run`](Self::run), choosing hyperparameters by k-fold search on the training split
    pub fn run_with_search(
        &self,
        data_path: Option<&Path>,
        folds: usize,
    ) -> Result<(TrainingReport, SearchResult)> {
        let (report, search) = self.execute(data_path, Some(folds))?;
        let search = search.ok_or_else(|| ChurnError::Validation("search did not run".to_string()))?;
        Ok((report, search))
    }

    fn execute(
        &self,
        data_path: Option<&Path>,
        search_folds: Option<usize>,
    ) -> Result<(TrainingReport, Option<SearchResult>)> {
        let run_id = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let settings = &self.config.data;
        info!(run_id = %run_id, "Starting training run");

        let records = self.records(data_path)?;
        let (x, y) = self.prepare(&records);
        let split = stratified_split(&y, settings.test_size, settings.random_state)?;
        let x_train = x.select(&split.train);
        let x_test = x.select(&split.test);
        let y_train: Vec<u8> = split.train.iter().map(|&i| y[i]).collect();
        let y_test: Vec<u8> = split.test.iter().map(|&i| y[i]).collect();

        let model_settings = &self.config.model;
        let search = match search_folds {
            Some(folds) => Some(hyperparameter_search(
                &x_train,
                &y_train,
                model_settings.model_type,
                &default_grid(model_settings.model_type),
                folds,
                settings.random_state,
            )?),
            None => None,
        };
        let hyperparameters = match &search {
            Some(result) => result.best.clone(),
            None => model_settings.hyperparameters(),
        };

        let mut model = ChurnModel::new(model_settings.model_type, Some(hyperparameters))?
            .with_decision_threshold(model_settings.decision_threshold)?;
        if let Some(version) = &model_settings.version {
            model = model.with_version(version.clone());
        }

        model.fit(&x_train, &y_train)?;
        let metrics = model.evaluate(&x_test, &y_test)?;
        model.set_metrics(metrics.clone())?;
        model.save(&model_settings.path)?;

        let model_version = model.version().unwrap_or_default().to_string();
        self.logger.log_training_completed(
            &run_id,
            &model_version,
            &model_settings.path.display().to_string(),
            &metrics,
        );

        let report = TrainingReport {
            run_id,
            model_path: model_settings.path.clone(),
            model_version,
            model_type: model.model_type(),
            metrics,
            samples_trained: y_train.len(),
            samples_tested: y_test.len(),
        };
        Ok((report, search))
    }

    /// Score a saved model on labeled data; synthetic rows are drawn with a
    /// seed offset from the training seed when no data is given
    pub fn evaluate(&self, model_path: &Path, data_path: Option<&Path>) -> Result<EvaluationMetrics> {
        let model = ChurnModel::load(model_path)?;
        let records = match data_path {
            Some(path) => self.load_labeled(path)?,
            None => data::generate_sample_data(
                self.config.data.sample_rows,
                self.config.data.random_state.wrapping_add(1),
            ),
        };
        let (x, y) = self.prepare(&records);
        let metrics = model.evaluate(&x, &y)?;
        info!(
            model_path = %model_path.display(),
            samples = metrics.samples,
            accuracy = metrics.accuracy,
            f1 = metrics.f1_score,
            "Evaluated model"
        );
        Ok(metrics)
    }

    fn records(&self, data_path: Option<&Path>) -> Result<Vec<LabeledRecord>> {
        let settings = &self.config.data;
        match data_path.map(Path::to_path_buf).or_else(|| settings.train_path.clone()) {
            Some(path) => self.load_labeled(&path),
            None => {
                warn!(rows = settings.sample_rows, "No training data configured, generating synthetic samples");
                Ok(data::generate_sample_data(settings.sample_rows, settings.random_state))
            }
        }
    }

    /// Load, validate and parse a labeled CSV
    pub fn load_labeled(&self, path: &Path) -> Result<Vec<LabeledRecord>> {
        let schema = RecordSchema::customer();
        let mut table = data::load(path)?;
        let target = self.config.data.target_column.as_str();
        data::validate(&table, &schema, &[target])?;

        if self.config.data.impute_missing {
            table.impute_missing(&schema);
        }
        table.labeled_records(&schema, target)
    }

    /// Feature matrix and label vector for labeled records
    pub fn prepare(&self, records: &[LabeledRecord]) -> (FeatureMatrix, Vec<u8>) {
        let customers: Vec<_> = records.iter().map(|l| l.record.clone()).collect();
        let labels = records.iter().map(|l| l.churn).collect();
        (self.features.transform(&customers), labels)
    }
}

/// Fit on the training split and score on the test split
pub fn train_model(
    x_train: &FeatureMatrix,
    y_train: &[u8],
    x_test: &FeatureMatrix,
    y_test: &[u8],
    model_type: ModelType,
    hyperparameters: Option<Hyperparameters>,
) -> Result<(ChurnModel, EvaluationMetrics)> {
    let mut model = ChurnModel::new(model_type, hyperparameters)?;
    model.fit(x_train, y_train)?;
    let metrics = model.evaluate(x_test, y_test)?;
    model.set_metrics(metrics.clone())?;
    Ok((model, metrics))
}

/// Small grid around the defaults of each model family
pub fn default_grid(model_type: ModelType) -> Vec<Hyperparameters> {
    match model_type {
        ModelType::LogisticRegression => [0.1, 1.0, 10.0]
            .into_iter()
            .map(|c| {
                Hyperparameters::LogisticRegression(LogisticParams {
                    c,
                    ..LogisticParams::default()
                })
            })
            .collect(),
        ModelType::RandomForest => {
            let mut grid = Vec::new();
            for n_estimators in [50, 100] {
                for max_depth in [5, 10, 20] {
                    grid.push(Hyperparameters::RandomForest(ForestParams {
                        n_estimators,
                        max_depth,
                        ..ForestParams::default()
                    }));
                }
            }
            grid
        }
    }
}

/// Stratified k-fold search over `grid`, scored by mean F1
pub fn hyperparameter_search(
    x: &FeatureMatrix,
    y: &[u8],
    model_type: ModelType,
    grid: &[Hyperparameters],
    folds: usize,
    seed: u64,
) -> Result<SearchResult> {
    if grid.is_empty() {
        return Err(ChurnError::Validation("empty hyperparameter grid".to_string()));
    }
    let splits = stratified_folds(y, folds, seed)?;

    let mut candidates = Vec::with_capacity(grid.len());
    for hyperparameters in grid {
        let mut total = 0.0;
        for split in &splits {
            let y_train: Vec<u8> = split.train.iter().map(|&i| y[i]).collect();
            let y_test: Vec<u8> = split.test.iter().map(|&i| y[i]).collect();
            let (_, metrics) = train_model(
                &x.select(&split.train),
                &y_train,
                &x.select(&split.test),
                &y_test,
                model_type,
                Some(hyperparameters.clone()),
            )?;
            total += metrics.f1_score;
        }
        let mean_f1 = total / splits.len() as f64;
        info!(candidate = ?hyperparameters, mean_f1 = mean_f1, "Scored candidate");
        candidates.push(CandidateScore {
            hyperparameters: hyperparameters.clone(),
            mean_f1,
        });
    }

    // First candidate wins ties
    let (best, best_score) = candidates
        .iter()
        .fold(None::<&CandidateScore>, |best, c| match best {
            Some(b) if b.mean_f1 >= c.mean_f1 => Some(b),
            _ => Some(c),
        })
        .map(|b| (b.hyperparameters.clone(), b.mean_f1))
        .ok_or_else(|| ChurnError::Validation("no candidate scored".to_string()))?;

    Ok(SearchResult {
        best,
        best_score,
        candidates,
    })
}
