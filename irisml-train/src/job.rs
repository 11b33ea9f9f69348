//! The training job: split, fit, evaluate, record, persist.

use irisml_core::algorithms::{LogisticRegression, SolverReport};
use irisml_core::artifact::DEFAULT_LOCAL_PATH;
use irisml_core::config::DEFAULT_MODEL_NAME;
use irisml_core::data::Dataset;
use irisml_core::tracking::{
    ARTIFACT_PATH, EXPERIMENT_NAME, RUN_NAME, RunHandle, RunStatus, latest_registered_version,
};
use irisml_core::training::{ClassificationMetrics, TrainingParams};
use irisml_core::{ExperimentTracker, IrisError, ModelArtifact};
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct JobOptions {
    pub params: TrainingParams,
    /// Held-out fraction, in (0, 1).
    pub test_size: f64,
    /// Promote the logged model to a new registry version.
    pub register: bool,
    pub model_name: String,
    /// Local artifact copy, always written.
    pub output: PathBuf,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            params: TrainingParams::default(),
            test_size: 0.2,
            register: true,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            output: PathBuf::from(DEFAULT_LOCAL_PATH),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub metrics: ClassificationMetrics,
    pub report: SolverReport,
    pub run_id: String,
    /// Highest registered version after this run, when registering.
    pub registered_version: Option<u64>,
    pub output: PathBuf,
}

/// Run one training job against `tracker`.
///
/// A tracking failure after the run is opened marks the run failed and
/// propagates; the local artifact is only written once tracking succeeded.
pub async fn run_job(
    options: &JobOptions,
    tracker: &dyn ExperimentTracker,
) -> Result<JobOutcome, IrisError> {
    let dataset = Dataset::iris();
    let (train, test) = dataset.train_test_split(options.test_size, options.params.random_state)?;
    info!(
        train = train.len(),
        test = test.len(),
        "Split iris dataset"
    );

    let fit = LogisticRegression::fit(&train, &options.params.fit_options())?;
    debug!(
        solver = %fit.report.solver,
        iterations = fit.report.iterations,
        converged = fit.report.converged,
        loss = fit.report.final_loss,
        "Fitted logistic regression"
    );

    let y_pred = test
        .features
        .iter()
        .map(|x| fit.model.predict(x))
        .collect::<Result<Vec<_>, _>>()?;
    let metrics = ClassificationMetrics::compute(&test.targets, &y_pred, dataset.n_classes);
    info!(
        accuracy = metrics.accuracy,
        f1_score = metrics.f1_score,
        "Evaluated on held-out split"
    );

    let artifact = ModelArtifact::new(fit.model, options.params);

    let run = tracker.start_run(EXPERIMENT_NAME, RUN_NAME).await?;
    info!(backend = tracker.backend(), run_id = %run.run_id, "Started run");
    let registered_version = match record_run(options, tracker, &run, &metrics, &artifact).await {
        Ok(version) => version,
        Err(e) => {
            if let Err(end_err) = tracker.end_run(&run, RunStatus::Failed).await {
                warn!("Failed to mark run {} as failed: {end_err}", run.run_id);
            }
            return Err(e);
        }
    };
    tracker.end_run(&run, RunStatus::Finished).await?;

    artifact.save(&options.output)?;
    info!("Saved model to {}", options.output.display());

    Ok(JobOutcome {
        metrics,
        report: fit.report,
        run_id: run.run_id,
        registered_version,
        output: options.output.clone(),
    })
}

async fn record_run(
    options: &JobOptions,
    tracker: &dyn ExperimentTracker,
    run: &RunHandle,
    metrics: &ClassificationMetrics,
    artifact: &ModelArtifact,
) -> Result<Option<u64>, IrisError> {
    tracker.log_params(run, &options.params.as_pairs()).await?;
    tracker.log_metrics(run, &metrics.as_pairs()).await?;
    let source = tracker.log_model(run, ARTIFACT_PATH, artifact).await?;
    debug!("Logged model artifact at {source}");

    if !options.register {
        return Ok(None);
    }
    let version = tracker
        .register_model(&options.model_name, &source, run)
        .await?;
    info!("Registered {} version {version}", options.model_name);
    let latest = latest_registered_version(tracker, &options.model_name).await?;
    info!("Latest version of {}: {latest}", options.model_name);
    Ok(Some(latest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use irisml_core::ModelRegistry;
    use irisml_core::tracking::LocalTracker;
    use std::sync::Mutex;

    fn options(dir: &std::path::Path) -> JobOptions {
        JobOptions {
            output: dir.join("iris_model.json"),
            ..JobOptions::default()
        }
    }

    #[tokio::test]
    async fn test_job_registers_and_writes_local_copy() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = LocalTracker::new(dir.path().join("mlruns"));
        let options = options(dir.path());

        let first = run_job(&options, &tracker).await.unwrap();
        assert!(first.metrics.accuracy >= 0.9);
        assert!(first.metrics.f1_score >= 0.9);
        assert_eq!(first.registered_version, Some(1));

        let second = run_job(&options, &tracker).await.unwrap();
        assert_eq!(second.registered_version, Some(2));
        assert_ne!(first.run_id, second.run_id);

        let local = ModelArtifact::load(&options.output).unwrap();
        assert_eq!(local.params, TrainingParams::default());
        assert!(local.classes_match_species());

        let loaded = tracker.load_latest(DEFAULT_MODEL_NAME).await.unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.artifact.model, local.model);
    }

    #[tokio::test]
    async fn test_job_without_registration() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = LocalTracker::new(dir.path().join("mlruns"));
        let options = JobOptions {
            register: false,
            ..options(dir.path())
        };

        let outcome = run_job(&options, &tracker).await.unwrap();
        assert_eq!(outcome.registered_version, None);
        assert!(outcome.output.exists());
        assert!(tracker.list_versions(DEFAULT_MODEL_NAME).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_job_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = LocalTracker::new(dir.path().join("mlruns"));
        let options = JobOptions {
            register: false,
            ..options(dir.path())
        };

        let a = run_job(&options, &tracker).await.unwrap();
        let b = run_job(&options, &tracker).await.unwrap();
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.report.iterations, b.report.iterations);
    }

    #[tokio::test]
    async fn test_invalid_test_size_fails_before_tracking() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = LocalTracker::new(dir.path().join("mlruns"));
        let options = JobOptions {
            test_size: 1.5,
            ..options(dir.path())
        };

        assert!(run_job(&options, &tracker).await.is_err());
        assert!(!dir.path().join("mlruns").exists());
        assert!(!options.output.exists());
    }

    /// Accepts everything except model uploads.
    #[derive(Default)]
    struct FailingUpload {
        ended: Mutex<Vec<RunStatus>>,
    }

    #[async_trait]
    impl ExperimentTracker for FailingUpload {
        fn backend(&self) -> &'static str {
            "failing"
        }

        async fn start_run(
            &self,
            experiment: &str,
            _run_name: &str,
        ) -> Result<RunHandle, IrisError> {
            Ok(RunHandle {
                run_id: "r1".into(),
                experiment_id: experiment.into(),
                artifact_uri: "unused".into(),
            })
        }

        async fn log_params(&self, _: &RunHandle, _: &[(String, String)]) -> Result<(), IrisError> {
            Ok(())
        }

        async fn log_metrics(&self, _: &RunHandle, _: &[(String, f64)]) -> Result<(), IrisError> {
            Ok(())
        }

        async fn log_model(
            &self,
            _: &RunHandle,
            _: &str,
            _: &ModelArtifact,
        ) -> Result<String, IrisError> {
            Err(IrisError::tracking("artifact upload refused"))
        }

        async fn register_model(&self, _: &str, _: &str, _: &RunHandle) -> Result<u64, IrisError> {
            unreachable!("registration after a failed upload")
        }

        async fn list_versions(&self, _: &str) -> Result<Vec<u64>, IrisError> {
            Ok(Vec::new())
        }

        async fn end_run(&self, _: &RunHandle, status: RunStatus) -> Result<(), IrisError> {
            self.ended.lock().unwrap().push(status);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_tracking_failure_marks_run_failed() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FailingUpload::default();
        let options = options(dir.path());

        let err = run_job(&options, &tracker).await.unwrap_err();
        assert!(err.to_string().contains("artifact upload refused"));
        assert_eq!(*tracker.ended.lock().unwrap(), vec![RunStatus::Failed]);
        assert!(!options.output.exists());
    }
}
