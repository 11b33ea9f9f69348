//! The log file is appended to, never truncated, and records each request
//! and its prediction. Runs in its own test binary because `logging::init`
//! installs the global subscriber.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use irisml_core::ModelArtifact;
use irisml_core::algorithms::{FitOptions, LogisticRegression};
use irisml_core::config::LoggingConfig;
use irisml_core::data::Dataset;
use irisml_core::training::TrainingParams;
use irisml_serve::{ModelSource, ServiceContext, logging, router};
use std::path::PathBuf;
use tower::ServiceExt;

const EARLIER_LINE: &str = "2024-01-01 00:00:00,000 - INFO - earlier run";
const SETOSA: &str =
    r#"{"sepal_length":5.1,"sepal_width":3.5,"petal_length":1.4,"petal_width":0.2}"#;

#[tokio::test]
async fn test_prediction_lines_are_appended_to_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("prediction.log");
    std::fs::write(&file, format!("{EARLIER_LINE}\n")).unwrap();

    let guard = logging::init(&LoggingConfig {
        file: file.clone(),
        level: "info".into(),
    })
    .unwrap();

    let (train, _) = Dataset::iris().train_test_split(0.2, 42).unwrap();
    let outcome = LogisticRegression::fit(&train, &FitOptions::default()).unwrap();
    let ctx = ServiceContext::new(
        ModelArtifact::new(outcome.model, TrainingParams::default()),
        ModelSource::Local {
            path: PathBuf::from("iris_model.json"),
        },
    );

    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from(SETOSA))
        .unwrap();
    let response = router(ctx.into_shared()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    drop(guard);

    let contents = std::fs::read_to_string(&file).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], EARLIER_LINE);

    let expected = format!(" - INFO - Incoming request {SETOSA}");
    let incoming = lines
        .iter()
        .position(|l| l.ends_with(&expected))
        .expect("incoming request line");
    let response = lines
        .iter()
        .position(|l| l.ends_with(" - INFO - Prediction response: setosa"))
        .expect("prediction response line");
    assert!(incoming > 0);
    assert!(response > incoming);
}
