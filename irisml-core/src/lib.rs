//! # irisml-core
//!
//! Shared building blocks for the two irisml processes:
//!
//! - the **training job** (`irisml-train`) fits a multinomial logistic
//!   regression on the embedded iris dataset, reports accuracy and weighted F1,
//!   records the run with an experiment tracker and writes a local artifact;
//! - the **prediction service** (`irisml-serve`) resolves one artifact at
//!   startup (registry first, local file second) and classifies feature
//!   vectors over HTTP.

// Foundation
pub mod config;
pub mod error;

// Domain
pub mod data;
pub mod features;
pub mod species;

// Modelling
pub mod algorithms;
pub mod artifact;
pub mod training;

// Experiment tracking & model registry
pub mod tracking;

// Re-exports
pub use artifact::ModelArtifact;
pub use config::{ServeConfig, load_config};
pub use error::IrisError;
pub use features::FeatureVector;
pub use species::Species;
pub use tracking::{ExperimentTracker, ModelRegistry};
