//! Experiment tracking and model registry.
//!
//! Two seams:
//! - [`ExperimentTracker`]: what the training job records a run with.
//! - [`ModelRegistry`]: what the prediction service resolves a model from.
//!
//! [`MlflowClient`] speaks the MLflow REST API for both; [`LocalTracker`]
//! keeps the same records in a directory when no tracking server is used.

pub mod local;
pub mod mlflow;

pub use local::LocalTracker;
pub use mlflow::MlflowClient;

use crate::artifact::ModelArtifact;
use crate::error::IrisError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Experiment the training job logs under.
pub const EXPERIMENT_NAME: &str = "iris_experiment_1";

/// Run name of each training run.
pub const RUN_NAME: &str = "logistic_regression";

/// Artifact sub-path the model is logged at within a run.
pub const ARTIFACT_PATH: &str = "model";

/// Identifies an open run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: String,
    pub experiment_id: String,
    /// Root URI of the run's artifact store.
    pub artifact_uri: String,
}

/// Terminal run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Finished,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
        }
    }
}

/// An artifact fetched from a registry, with the version it was resolved at.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub artifact: ModelArtifact,
    pub version: u64,
}

/// Records parameters, metrics and artifacts of training runs.
#[async_trait]
pub trait ExperimentTracker: Send + Sync {
    /// Short backend name for log lines.
    fn backend(&self) -> &'static str;

    /// Open a run under `experiment`, creating the experiment if needed.
    async fn start_run(&self, experiment: &str, run_name: &str) -> Result<RunHandle, IrisError>;

    async fn log_params(&self, run: &RunHandle, params: &[(String, String)])
    -> Result<(), IrisError>;

    async fn log_metrics(&self, run: &RunHandle, metrics: &[(String, f64)])
    -> Result<(), IrisError>;

    /// Store `artifact` at `artifact_path` within the run. Returns the source
    /// URI to register it from.
    async fn log_model(
        &self,
        run: &RunHandle,
        artifact_path: &str,
        artifact: &ModelArtifact,
    ) -> Result<String, IrisError>;

    /// Create a new version of registered model `name` from `source`,
    /// creating the registered model on first use. Returns the new version.
    async fn register_model(
        &self,
        name: &str,
        source: &str,
        run: &RunHandle,
    ) -> Result<u64, IrisError>;

    /// All version numbers registered under `name`.
    async fn list_versions(&self, name: &str) -> Result<Vec<u64>, IrisError>;

    async fn end_run(&self, run: &RunHandle, status: RunStatus) -> Result<(), IrisError>;
}

/// Highest version registered under `name`.
pub async fn latest_registered_version(
    tracker: &dyn ExperimentTracker,
    name: &str,
) -> Result<u64, IrisError> {
    tracker
        .list_versions(name)
        .await?
        .into_iter()
        .max()
        .ok_or_else(|| IrisError::not_found(format!("no versions registered under '{name}'")))
}

/// Source of trained models for the prediction service.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Single short probe; any failure means unavailable.
    async fn is_available(&self) -> bool;

    /// Load the artifact registered under `name` at its latest version.
    async fn load_latest(&self, name: &str) -> Result<LoadedModel, IrisError>;
}
