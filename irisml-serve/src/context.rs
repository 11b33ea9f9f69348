//! The process-wide service context: one resolved model, read-only.

use irisml_core::{FeatureVector, IrisError, ModelArtifact, Species};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Decimal places the reported probability is rounded to.
pub const PROBABILITY_DECIMALS: i32 = 4;

/// Where the served model was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Registry { name: String, version: u64 },
    Local { path: PathBuf },
}

impl ModelSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Registry { .. } => "registry",
            Self::Local { .. } => "local",
        }
    }

    pub fn version(&self) -> Option<u64> {
        match self {
            Self::Registry { version, .. } => Some(*version),
            Self::Local { .. } => None,
        }
    }
}

/// Result of classifying one feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub species: Species,
    /// Highest class probability, rounded to [`PROBABILITY_DECIMALS`] places.
    pub probability: f64,
}

/// Model chosen at startup plus its provenance.
#[derive(Debug)]
pub struct ServiceContext {
    artifact: ModelArtifact,
    source: ModelSource,
}

/// Shared handle given to request handlers.
pub type SharedContext = Arc<ServiceContext>;

impl ServiceContext {
    pub fn new(artifact: ModelArtifact, source: ModelSource) -> Self {
        Self { artifact, source }
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    pub fn into_shared(self) -> SharedContext {
        Arc::new(self)
    }

    /// Classify `features`. Class indices are mapped through the static
    /// species table; an index outside it is an error.
    pub fn predict(&self, features: &FeatureVector) -> Result<Prediction, IrisError> {
        features.validate()?;
        let x = features.to_array();
        let species = Species::from_index(self.artifact.predict(&x)?)?;
        let proba = self.artifact.predict_proba(&x)?;
        if proba.iter().any(|p| !p.is_finite()) {
            return Err(IrisError::model("non-finite class probabilities"));
        }
        let max = proba.into_iter().fold(0.0_f64, f64::max);
        Ok(Prediction {
            species,
            probability: round_probability(max),
        })
    }
}

pub fn round_probability(p: f64) -> f64 {
    let scale = 10f64.powi(PROBABILITY_DECIMALS);
    (p * scale).round() / scale
}
