//! # irisml-serve
//!
//! Resolves a single [`ModelArtifact`](irisml_core::ModelArtifact) at startup
//! and serves it behind two routes:
//!
//! - `POST /predict` takes the four iris measurements and returns the
//!   predicted species with its probability;
//! - `GET /health` reports where the model came from.
//!
//! Model resolution ([`resolve`]) tries the registry first and falls back to
//! the local artifact file. The chosen model is immutable for the life of the
//! process and shared read-only across requests.

pub mod context;
pub mod error;
pub mod logging;
pub mod resolve;
pub mod server;

pub use context::{ModelSource, Prediction, ServiceContext, SharedContext};
pub use error::{PredictError, ServeError};
pub use resolve::{
    ModelResolution, RegistryAttempt, ResolutionReport, build_context, registry_from_config,
    resolve_model,
};
pub use server::{PredictionResponse, router};
