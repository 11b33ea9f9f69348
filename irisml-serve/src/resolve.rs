//! Startup model resolution: registry first, local artifact second.
//!
//! [`resolve_model`] only decides. It returns a [`ResolutionReport`] holding
//! what happened on the registry tier and the final outcome, and
//! [`ResolutionReport::log`] writes the corresponding log lines afterwards.

use crate::context::{ModelSource, ServiceContext};
use crate::error::ServeError;
use irisml_core::config::{RegistryBackend, RegistryConfig};
use irisml_core::tracking::{LocalTracker, MlflowClient};
use irisml_core::{IrisError, ModelArtifact, ModelRegistry, ServeConfig};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// What happened when the registry was consulted.
#[derive(Debug)]
pub enum RegistryAttempt {
    /// No registry configured.
    Skipped,
    /// The health probe failed; no load was attempted.
    Unavailable,
    /// The registry answered but the model could not be loaded.
    LoadFailed(IrisError),
    Loaded { version: u64 },
}

/// Final outcome of resolution.
#[derive(Debug)]
pub enum ModelResolution {
    Remote {
        artifact: ModelArtifact,
        name: String,
        version: u64,
    },
    Local {
        artifact: ModelArtifact,
        path: PathBuf,
    },
    Failed {
        path: PathBuf,
        error: IrisError,
    },
}

impl ModelResolution {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Remote { .. } => "remote",
            Self::Local { .. } => "local",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug)]
pub struct ResolutionReport {
    pub registry: RegistryAttempt,
    pub outcome: ModelResolution,
}

/// Pick the model to serve.
///
/// The registry is probed once; only when it reports healthy is
/// `load_latest` called. Any registry failure falls through to the artifact
/// at `local_path`.
pub async fn resolve_model(
    registry: Option<&dyn ModelRegistry>,
    model_name: &str,
    local_path: &Path,
) -> ResolutionReport {
    let registry_attempt = match registry {
        None => RegistryAttempt::Skipped,
        Some(registry) => {
            if !registry.is_available().await {
                RegistryAttempt::Unavailable
            } else {
                match registry.load_latest(model_name).await {
                    Ok(loaded) => {
                        return ResolutionReport {
                            registry: RegistryAttempt::Loaded {
                                version: loaded.version,
                            },
                            outcome: ModelResolution::Remote {
                                artifact: loaded.artifact,
                                name: model_name.to_string(),
                                version: loaded.version,
                            },
                        };
                    }
                    Err(e) => RegistryAttempt::LoadFailed(e),
                }
            }
        }
    };

    let outcome = match ModelArtifact::load(local_path) {
        Ok(artifact) => ModelResolution::Local {
            artifact,
            path: local_path.to_path_buf(),
        },
        Err(error) => ModelResolution::Failed {
            path: local_path.to_path_buf(),
            error,
        },
    };
    ResolutionReport {
        registry: registry_attempt,
        outcome,
    }
}

impl ResolutionReport {
    /// Emit one log line per resolution step.
    pub fn log(&self) {
        match &self.registry {
            RegistryAttempt::Skipped => info!("Model registry disabled"),
            RegistryAttempt::Unavailable => {
                info!("Model registry is not available");
            }
            RegistryAttempt::LoadFailed(e) => {
                info!("Attempting to load model from registry");
                error!("Failed to load model from registry: {e}");
            }
            RegistryAttempt::Loaded { version } => {
                info!("Attempting to load model from registry");
                info!("Successfully loaded model from registry (version {version})");
            }
        }
        match &self.outcome {
            ModelResolution::Remote { .. } => {}
            ModelResolution::Local { path, .. } => {
                info!("Falling back to local model file {}", path.display());
                info!("Successfully loaded model from local file");
            }
            ModelResolution::Failed { error, .. } => {
                info!("Falling back to local model file");
                error!("{error}");
            }
        }
        if let ModelResolution::Remote { artifact, .. } | ModelResolution::Local { artifact, .. } =
            &self.outcome
            && !artifact.classes_match_species()
        {
            warn!(
                classes = ?artifact.classes,
                "Model class order differs from the species mapping; labels may be wrong"
            );
        }
    }

    /// Turn a successful resolution into the service context.
    pub fn into_context(self) -> Result<ServiceContext, ServeError> {
        match self.outcome {
            ModelResolution::Remote {
                artifact,
                name,
                version,
            } => Ok(ServiceContext::new(
                artifact,
                ModelSource::Registry { name, version },
            )),
            ModelResolution::Local { artifact, path } => {
                Ok(ServiceContext::new(artifact, ModelSource::Local { path }))
            }
            ModelResolution::Failed { error, .. } if error.is_not_found() => {
                Err(ServeError::ModelNotFound(error.to_string()))
            }
            ModelResolution::Failed { path, error } => Err(ServeError::ModelLoad(format!(
                "{}: {error}",
                path.display()
            ))),
        }
    }
}

/// The registry selected by `config`, or `None` when it is disabled.
pub fn registry_from_config(config: &RegistryConfig) -> Option<Box<dyn ModelRegistry>> {
    if !config.enabled {
        return None;
    }
    let registry: Box<dyn ModelRegistry> = match config.backend {
        RegistryBackend::Mlflow => Box::new(MlflowClient::from_config(config)),
        RegistryBackend::Local => Box::new(LocalTracker::new(config.local_root.clone())),
    };
    Some(registry)
}

/// Resolve, log and build the context in one step, as the binary does.
pub async fn build_context(
    config: &ServeConfig,
    registry: Option<&dyn ModelRegistry>,
) -> Result<ServiceContext, ServeError> {
    let registry = registry.filter(|_| config.registry.enabled);
    let report = resolve_model(
        registry,
        &config.registry.model_name,
        &config.model.local_path,
    )
    .await;
    report.log();
    report.into_context()
}

#[cfg(test)]
mod tests {
    use super::*;
    use irisml_core::algorithms::LogisticRegression;
    use irisml_core::training::TrainingParams;

    fn artifact() -> ModelArtifact {
        let model =
            LogisticRegression::new(vec![vec![0.0; 4], vec![0.0; 4], vec![0.0; 4]], vec![0.0; 3])
                .unwrap();
        ModelArtifact::new(model, TrainingParams::default())
    }

    #[test]
    fn test_resolution_kind() {
        let local = ModelResolution::Local {
            artifact: artifact(),
            path: PathBuf::from("m.json"),
        };
        assert_eq!(local.kind(), "local");
        let failed = ModelResolution::Failed {
            path: PathBuf::from("m.json"),
            error: IrisError::not_found("m.json"),
        };
        assert_eq!(failed.kind(), "failed");
    }

    #[test]
    fn test_failed_not_found_maps_to_model_not_found() {
        let report = ResolutionReport {
            registry: RegistryAttempt::Unavailable,
            outcome: ModelResolution::Failed {
                path: PathBuf::from("iris_model.json"),
                error: IrisError::not_found("Model file iris_model.json not found"),
            },
        };
        let err = report.into_context().unwrap_err();
        assert!(matches!(err, ServeError::ModelNotFound(_)));
        assert!(err.to_string().contains("iris_model.json not found"));
    }

    #[test]
    fn test_failed_corrupt_maps_to_model_load() {
        let report = ResolutionReport {
            registry: RegistryAttempt::Skipped,
            outcome: ModelResolution::Failed {
                path: PathBuf::from("iris_model.json"),
                error: IrisError::model("unsupported artifact format version 9"),
            },
        };
        assert!(matches!(
            report.into_context().unwrap_err(),
            ServeError::ModelLoad(_)
        ));
    }

    #[test]
    fn test_unavailable_registry_logs_fallback_in_order() {
        let report = ResolutionReport {
            registry: RegistryAttempt::Unavailable,
            outcome: ModelResolution::Local {
                artifact: artifact(),
                path: PathBuf::from("iris_model.json"),
            },
        };
        let out = crate::logging::tests::capture(|| report.log());
        let messages: Vec<&str> = out
            .lines()
            .filter_map(|line| line.splitn(3, " - ").nth(2))
            .collect();
        assert_eq!(
            messages,
            vec![
                "Model registry is not available",
                "Falling back to local model file iris_model.json",
                "Successfully loaded model from local file",
            ]
        );
        assert!(out.lines().all(|line| line.contains(" - INFO - ")));
    }

    #[test]
    fn test_registry_load_failure_is_logged_as_error() {
        let report = ResolutionReport {
            registry: RegistryAttempt::LoadFailed(IrisError::not_found("no versions")),
            outcome: ModelResolution::Local {
                artifact: artifact(),
                path: PathBuf::from("iris_model.json"),
            },
        };
        let out = crate::logging::tests::capture(|| report.log());
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].ends_with(" - INFO - Attempting to load model from registry"));
        assert!(lines[1].contains(" - ERROR - Failed to load model from registry: "));
        assert!(lines[2].ends_with(" - INFO - Falling back to local model file iris_model.json"));
    }

    #[tokio::test]
    async fn test_no_registry_uses_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iris_model.json");
        artifact().save(&path).unwrap();

        let report = resolve_model(None, "iris_classifier_model", &path).await;
        assert!(matches!(report.registry, RegistryAttempt::Skipped));
        assert_eq!(report.outcome.kind(), "local");
    }
}
