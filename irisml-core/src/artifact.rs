//! Serialized model artifact shared between training and serving.

use crate::algorithms::LogisticRegression;
use crate::error::IrisError;
use crate::features::FEATURE_NAMES;
use crate::species::Species;
use crate::training::TrainingParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current on-disk format version.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// File name of the artifact inside a tracked run or registry version.
pub const ARTIFACT_FILE_NAME: &str = "model.json";

/// Where the training job writes, and the service looks for, the local copy.
pub const DEFAULT_LOCAL_PATH: &str = "iris_model.json";

/// A trained classifier plus the metadata needed to serve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub model: LogisticRegression,
    /// Label names in class-index order at training time.
    pub classes: Vec<String>,
    pub feature_names: Vec<String>,
    pub params: TrainingParams,
    pub created_at: DateTime<Utc>,
}

impl ModelArtifact {
    pub fn new(model: LogisticRegression, params: TrainingParams) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            model,
            classes: Species::names(),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            params,
            created_at: Utc::now(),
        }
    }

    pub fn predict(&self, x: &[f64]) -> Result<usize, IrisError> {
        self.model.predict(x)
    }

    pub fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>, IrisError> {
        self.model.predict_proba(x)
    }

    /// Whether the stored class order matches the static species mapping.
    pub fn classes_match_species(&self) -> bool {
        self.classes == Species::names()
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, IrisError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, IrisError> {
        let artifact: Self = serde_json::from_slice(bytes)?;
        artifact.validate()?;
        Ok(artifact)
    }

    fn validate(&self) -> Result<(), IrisError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(IrisError::model(format!(
                "unsupported artifact format version {} (expected {ARTIFACT_FORMAT_VERSION})",
                self.format_version
            )));
        }
        self.model.check_shape()?;
        if self.model.n_features() != self.feature_names.len() {
            return Err(IrisError::model(format!(
                "model expects {} features but artifact lists {}",
                self.model.n_features(),
                self.feature_names.len()
            )));
        }
        if self.model.n_classes() != self.classes.len() {
            return Err(IrisError::model(format!(
                "model has {} classes but artifact lists {}",
                self.model.n_classes(),
                self.classes.len()
            )));
        }
        Ok(())
    }

    /// Write atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), IrisError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, self.to_json_bytes()?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IrisError> {
        if !path.exists() {
            return Err(IrisError::not_found(format!(
                "Model file {} not found",
                path.display()
            )));
        }
        let bytes = std::fs::read(path)?;
        Self::from_json_slice(&bytes)
    }
}
