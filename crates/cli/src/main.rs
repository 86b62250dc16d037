//! Churn prediction CLI
//!
//! Generates sample data, trains and evaluates models locally, and queries
//! a running churn API.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use churn_lib::{config::ChurnConfig, model::ModelType};
use clap::{Parser, Subcommand};
use commands::{local, remote};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Customer Churn Prediction CLI
#[derive(Parser)]
#[command(name = "churnctl")]
#[command(author, version, about = "CLI for the Customer Churn Prediction service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (falls back to ~/.config/churnctl/config.json, then http://localhost:8080)
    #[arg(long, env = "CHURN_API_URL")]
    pub api_url: Option<String>,

    /// Service configuration file used by local commands
    #[arg(long, env = "CHURN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a synthetic labeled customer data set
    Generate {
        /// Number of customers (defaults to data.sample_rows)
        #[arg(long, short)]
        rows: Option<usize>,

        /// Random seed (defaults to data.random_state)
        #[arg(long)]
        seed: Option<u64>,

        /// Output CSV path
        #[arg(long, short, default_value = "data/customers.csv")]
        output: PathBuf,
    },

    /// Train a model and save the artifact
    Train {
        /// Training CSV (synthetic data is generated when absent)
        #[arg(long, short)]
        data: Option<PathBuf>,

        /// Model type (logistic_regression or random_forest)
        #[arg(long, short)]
        model_type: Option<ModelType>,

        /// Where to write the artifact (defaults to model.path)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Choose hyperparameters by cross-validated search
        #[arg(long)]
        search: bool,

        /// Folds used by --search
        #[arg(long, default_value_t = 3)]
        folds: usize,

        /// Fill empty CSV cells with the column median or most frequent value
        #[arg(long)]
        impute: bool,
    },

    /// Score a saved model on labeled data
    Evaluate {
        /// Model artifact (defaults to model.path)
        #[arg(long, short)]
        model: Option<PathBuf>,

        /// Labeled CSV (synthetic data is generated when absent)
        #[arg(long, short)]
        data: Option<PathBuf>,
    },

    /// Predict churn for one customer via the API
    Predict {
        /// JSON file holding the customer
        file: Option<PathBuf>,

        /// Customer as inline JSON
        #[arg(long, conflicts_with = "file")]
        json: Option<String>,
    },

    /// Predict churn for many customers via the API
    Batch {
        /// JSON file holding an array of customers or {"customers": [...]}
        file: PathBuf,
    },

    /// Show the model served by the API
    Info,

    /// Show API health and readiness
    Status,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn api_client(cli_url: Option<&str>) -> Result<client::ApiClient> {
    let file_config = config::Config::load()?;
    let url = file_config.resolve_api_url(cli_url);
    debug!(api_url = %url, "Using API endpoint");
    client::ApiClient::new(&url)
}

fn service_config(path: Option<&PathBuf>) -> Result<ChurnConfig> {
    ChurnConfig::load(path.map(PathBuf::as_path)).context("Failed to load service configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Generate { rows, seed, output } => {
            let config = service_config(cli.config.as_ref())?;
            local::generate(&config, rows, seed, &output, cli.format)?;
        }
        Commands::Train {
            data,
            model_type,
            output,
            search,
            folds,
            impute,
        } => {
            let config = service_config(cli.config.as_ref())?;
            let options = local::TrainOptions {
                data,
                model_type,
                model_path: output,
                search_folds: search.then_some(folds),
                impute_missing: impute,
            };
            local::train(config, options, cli.format)?;
        }
        Commands::Evaluate { model, data } => {
            let config = service_config(cli.config.as_ref())?;
            local::evaluate(config, model, data, cli.format)?;
        }
        Commands::Predict { file, json } => {
            let customer = remote::read_input(json.as_deref(), file.as_deref())?;
            let client = api_client(cli.api_url.as_deref())?;
            remote::predict(&client, customer, cli.format).await?;
        }
        Commands::Batch { file } => {
            let input = remote::read_input(None, Some(&file))?;
            let customers = remote::batch_customers(input)?;
            let client = api_client(cli.api_url.as_deref())?;
            remote::batch(&client, customers, cli.format).await?;
        }
        Commands::Info => {
            let client = api_client(cli.api_url.as_deref())?;
            remote::info(&client, cli.format).await?;
        }
        Commands::Status => {
            let client = api_client(cli.api_url.as_deref())?;
            remote::status(&client, cli.format).await?;
        }
    }

    Ok(())
}
