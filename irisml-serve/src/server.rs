//! HTTP routes for the prediction service.

use crate::context::SharedContext;
use crate::error::{PredictError, ServeError};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use irisml_core::FeatureVector;
use irisml_core::config::ServerConfig;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Body of a successful `/predict` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub status: String,
    pub prediction: String,
    pub probability: f64,
}

/// Build the axum Router with `/predict` and `/health`.
pub fn router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn predict_handler(
    State(ctx): State<SharedContext>,
    Json(features): Json<FeatureVector>,
) -> Result<Json<PredictionResponse>, PredictError> {
    info!(
        "Incoming request {}",
        serde_json::to_string(&features).unwrap_or_default()
    );
    match ctx.predict(&features) {
        Ok(prediction) => {
            info!("Prediction response: {}", prediction.species);
            Ok(Json(PredictionResponse {
                status: "success".to_string(),
                prediction: prediction.species.to_string(),
                probability: prediction.probability,
            }))
        }
        Err(e) => {
            error!("Prediction error: {e}");
            Err(e.into())
        }
    }
}

async fn health_handler(State(ctx): State<SharedContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "model_source": ctx.source().kind(),
        "model_version": ctx.source().version(),
    }))
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn run(config: &ServerConfig, ctx: SharedContext) -> Result<(), ServeError> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServeError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!("Listening on {addr}");
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
