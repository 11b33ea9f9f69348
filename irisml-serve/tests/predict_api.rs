//! End-to-end tests of the HTTP routes using `tower::ServiceExt::oneshot`.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use irisml_core::ModelArtifact;
use irisml_core::algorithms::{FitOptions, LogisticRegression};
use irisml_core::data::Dataset;
use irisml_core::training::TrainingParams;
use irisml_serve::{ModelSource, PredictionResponse, ServiceContext, router};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::path::PathBuf;
use tower::ServiceExt;

const LABELS: [&str; 3] = ["setosa", "versicolor", "virginica"];

fn trained_artifact() -> ModelArtifact {
    let (train, _test) = Dataset::iris().train_test_split(0.2, 42).unwrap();
    let outcome = LogisticRegression::fit(&train, &FitOptions::default()).unwrap();
    ModelArtifact::new(outcome.model, TrainingParams::default())
}

fn app_with(artifact: ModelArtifact, source: ModelSource) -> Router {
    router(ServiceContext::new(artifact, source).into_shared())
}

fn app() -> Router {
    app_with(
        trained_artifact(),
        ModelSource::Local {
            path: PathBuf::from("iris_model.json"),
        },
    )
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn post_predict(app: Router, body: String) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

fn features(sl: f64, sw: f64, pl: f64, pw: f64) -> String {
    json!({
        "sepal_length": sl,
        "sepal_width": sw,
        "petal_length": pl,
        "petal_width": pw,
    })
    .to_string()
}

async fn predict_ok(app: Router, body: String) -> PredictionResponse {
    let (status, bytes) = post_predict(app, body).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_predict_setosa() {
    let response = predict_ok(app(), features(5.1, 3.5, 1.4, 0.2)).await;
    assert_eq!(response.status, "success");
    assert_eq!(response.prediction, "setosa");
    assert!(response.probability >= 0.9 && response.probability <= 1.0);
}

#[tokio::test]
async fn test_predict_virginica() {
    let response = predict_ok(app(), features(6.7, 3.0, 5.2, 2.3)).await;
    assert_eq!(response.prediction, "virginica");
}

#[tokio::test]
async fn test_response_shape() {
    let (status, bytes) = post_predict(app(), features(5.9, 3.0, 4.2, 1.5)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let object = body.as_object().unwrap();
    let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["prediction", "probability", "status"]);
    assert_eq!(body["prediction"], "versicolor");
}

#[tokio::test]
async fn test_probability_is_rounded_to_four_places() {
    for (sl, sw, pl, pw) in [(5.1, 3.5, 1.4, 0.2), (6.0, 2.7, 5.1, 1.6), (6.3, 3.3, 6.0, 2.5)] {
        let p = predict_ok(app(), features(sl, sw, pl, pw)).await.probability;
        assert_eq!((p * 10_000.0).round() / 10_000.0, p);
        assert!((0.0..=1.0).contains(&p));
    }
}

#[tokio::test]
async fn test_prediction_is_deterministic() {
    let body = features(6.1, 2.8, 4.7, 1.2);
    let first = post_predict(app(), body.clone()).await;
    let second = post_predict(app(), body).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_labels_always_known() {
    let app = app();
    for sample in Dataset::iris().features.iter().step_by(7) {
        let response =
            predict_ok(app.clone(), features(sample[0], sample[1], sample[2], sample[3])).await;
        assert!(LABELS.contains(&response.prediction.as_str()));
    }
}

#[tokio::test]
async fn test_missing_field_is_rejected() {
    let body = json!({ "sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4 });
    let (status, _) = post_predict(app(), body.to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_non_numeric_field_is_rejected() {
    let body = json!({
        "sepal_length": "long",
        "sepal_width": 3.5,
        "petal_length": 1.4,
        "petal_width": 0.2,
    });
    let (status, _) = post_predict(app(), body.to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let (status, _) = post_predict(app(), "{not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_class_index_is_500_with_detail() {
    let model = LogisticRegression::new(
        vec![vec![0.0; 4], vec![0.0; 4], vec![0.0; 4], vec![0.0; 4]],
        vec![0.0, 0.0, 0.0, 5.0],
    )
    .unwrap();
    let mut artifact = ModelArtifact::new(model, TrainingParams::default());
    artifact.classes.push("unknown".to_string());
    let app = app_with(
        artifact,
        ModelSource::Local {
            path: PathBuf::from("iris_model.json"),
        },
    );

    let (status, bytes) = post_predict(app, features(5.1, 3.5, 1.4, 0.2)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["detail"], "Model error: unknown class index 3");
}

#[tokio::test]
async fn test_overflowing_features_are_500_not_a_zero_probability() {
    let (status, bytes) = post_predict(app(), features(1e308, 1e308, 1e308, 1e308)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("non-finite"), "{detail}");
}

#[tokio::test]
async fn test_health_reports_source() {
    let app = app_with(
        trained_artifact(),
        ModelSource::Registry {
            name: "iris_classifier_model".into(),
            version: 4,
        },
    );
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, bytes) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body,
        json!({ "status": "ok", "model_source": "registry", "model_version": 4 })
    );
}

#[tokio::test]
async fn test_health_local_has_no_version() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (_, bytes) = send(app(), request).await;
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["model_source"], "local");
    assert_eq!(body["model_version"], Value::Null);
}
