//! The embedded iris table and seeded train/test splits.

mod iris;

pub use iris::N_SAMPLES;

use crate::error::IrisError;
use crate::features::N_FEATURES;
use crate::species::Species;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// A set of labelled samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub features: Vec<[f64; N_FEATURES]>,
    pub targets: Vec<usize>,
    pub n_classes: usize,
}

impl Dataset {
    pub fn new(
        features: Vec<[f64; N_FEATURES]>,
        targets: Vec<usize>,
        n_classes: usize,
    ) -> Result<Self, IrisError> {
        if features.len() != targets.len() {
            return Err(IrisError::dataset(format!(
                "{} feature rows but {} targets",
                features.len(),
                targets.len()
            )));
        }
        if let Some(t) = targets.iter().find(|&&t| t >= n_classes) {
            return Err(IrisError::dataset(format!(
                "target {t} outside 0..{n_classes}"
            )));
        }
        Ok(Self {
            features,
            targets,
            n_classes,
        })
    }

    /// The full iris dataset.
    pub fn iris() -> Self {
        Self {
            features: iris::FEATURES.to_vec(),
            targets: iris::TARGETS.to_vec(),
            n_classes: Species::ALL.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Number of samples per class index.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &t in &self.targets {
            counts[t] += 1;
        }
        counts
    }

    fn subset(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i]).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
            n_classes: self.n_classes,
        }
    }

    /// Shuffle with a seeded RNG and split off `ceil(test_size * n)` samples
    /// for evaluation. Returns `(train, test)`.
    pub fn train_test_split(&self, test_size: f64, seed: u64) -> Result<(Self, Self), IrisError> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(IrisError::invalid_input(format!(
                "test_size must be in (0, 1), got {test_size}"
            )));
        }
        let n = self.len();
        let n_test = (test_size * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(IrisError::dataset(format!(
                "test_size {test_size} leaves an empty split for {n} samples"
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let (test_idx, train_idx) = indices.split_at(n_test);
        Ok((self.subset(train_idx), self.subset(test_idx)))
    }
}
