mod job;

use clap::Parser;
use irisml_core::ExperimentTracker;
use irisml_core::algorithms::Solver;
use irisml_core::artifact::DEFAULT_LOCAL_PATH;
use irisml_core::config::DEFAULT_MODEL_NAME;
use irisml_core::tracking::{LocalTracker, MlflowClient};
use irisml_core::training::TrainingParams;
use job::{JobOptions, run_job};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Train the iris classifier and record the run
#[derive(Parser, Debug)]
#[command(name = "irisml-train", version, about, long_about = None)]
struct Cli {
    /// Maximum optimiser iterations
    #[arg(long, default_value_t = 200)]
    max_iter: usize,

    /// Seed for the train/test split and the solver
    #[arg(long, default_value_t = 42)]
    random_state: u64,

    /// Optimiser: lbfgs, newton-cg, sag or saga
    #[arg(long, default_value_t = Solver::Lbfgs)]
    solver: Solver,

    /// Fraction of samples held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    test_size: f64,

    /// MLflow tracking server; falls back to MLFLOW_TRACKING_URI, then to a local ./mlruns store
    #[arg(long)]
    mlflow_tracking_uri: Option<String>,

    /// Skip registering the model
    #[arg(long)]
    no_register_model: bool,

    /// Registered model name
    #[arg(long, default_value = DEFAULT_MODEL_NAME)]
    model_name: String,

    /// Local model artifact path
    #[arg(short, long, default_value = DEFAULT_LOCAL_PATH)]
    output: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));
    tracing_subscriber::registry().with(stderr_layer).init();

    let tracker: Box<dyn ExperimentTracker> = match cli
        .mlflow_tracking_uri
        .clone()
        .or_else(|| std::env::var("MLFLOW_TRACKING_URI").ok())
    {
        Some(uri) => {
            info!("Tracking to MLflow at {uri}");
            Box::new(MlflowClient::new(uri))
        }
        None => {
            let tracker = LocalTracker::default();
            info!("No tracking server given, recording to {}", tracker.root().display());
            Box::new(tracker)
        }
    };

    let options = JobOptions {
        params: TrainingParams {
            max_iter: cli.max_iter,
            random_state: cli.random_state,
            solver: cli.solver,
        },
        test_size: cli.test_size,
        register: !cli.no_register_model,
        model_name: cli.model_name,
        output: cli.output,
    };

    let outcome = run_job(&options, tracker.as_ref()).await?;
    if let Some(version) = outcome.registered_version {
        info!("Model {} is at version {version}", options.model_name);
    }
    println!(
        "Training completed with accuracy: {:.4}",
        outcome.metrics.accuracy
    );
    Ok(())
}
