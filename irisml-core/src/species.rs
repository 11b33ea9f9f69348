//! Iris species labels and their class-index mapping.

use crate::error::IrisError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three iris species the classifier distinguishes.
///
/// The discriminant order is the class-index order the classifier is trained
/// with: index 0 is `setosa`, 1 is `versicolor`, 2 is `virginica`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Setosa,
    Versicolor,
    Virginica,
}

impl Species {
    /// All species in class-index order.
    pub const ALL: [Species; 3] = [Species::Setosa, Species::Versicolor, Species::Virginica];

    /// Map a dense class index to its species.
    pub fn from_index(index: usize) -> Result<Self, IrisError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or_else(|| IrisError::model(format!("unknown class index {index}")))
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setosa => "setosa",
            Self::Versicolor => "versicolor",
            Self::Virginica => "virginica",
        }
    }

    /// Class names in index order, as stored in model artifacts.
    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|s| s.as_str().to_string()).collect()
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
