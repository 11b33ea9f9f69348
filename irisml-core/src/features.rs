//! The four-measurement feature vector.

use crate::error::IrisError;
use serde::{Deserialize, Serialize};

/// Number of measurements per sample.
pub const N_FEATURES: usize = 4;

/// Feature names in the fixed column order the classifier expects.
pub const FEATURE_NAMES: [&str; N_FEATURES] =
    ["sepal_length", "sepal_width", "petal_length", "petal_width"];

/// Sepal and petal measurements of one flower, in centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
}

impl FeatureVector {
    pub fn new(sepal_length: f64, sepal_width: f64, petal_length: f64, petal_width: f64) -> Self {
        Self {
            sepal_length,
            sepal_width,
            petal_length,
            petal_width,
        }
    }

    /// Values in `FEATURE_NAMES` order.
    pub fn to_array(&self) -> [f64; N_FEATURES] {
        [
            self.sepal_length,
            self.sepal_width,
            self.petal_length,
            self.petal_width,
        ]
    }

    /// Reject NaN and infinite measurements.
    pub fn validate(&self) -> Result<(), IrisError> {
        for (name, value) in FEATURE_NAMES.iter().zip(self.to_array()) {
            if !value.is_finite() {
                return Err(IrisError::invalid_input(format!(
                    "feature {name} must be finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl From<[f64; N_FEATURES]> for FeatureVector {
    fn from(v: [f64; N_FEATURES]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}
