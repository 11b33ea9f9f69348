//! MLflow tracking server client (REST API 2.0).

use super::{ExperimentTracker, LoadedModel, ModelRegistry, RunHandle, RunStatus};
use crate::artifact::{ARTIFACT_FILE_NAME, ModelArtifact};
use crate::config::RegistryConfig;
use crate::error::IrisError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const ARTIFACTS_SCHEME: &str = "mlflow-artifacts:";

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Experiment {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct GetExperimentResponse {
    experiment: Experiment,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    run_id: String,
    #[serde(default)]
    artifact_uri: String,
}

#[derive(Debug, Deserialize)]
struct Run {
    info: RunInfo,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: Run,
}

#[derive(Debug, Deserialize)]
struct ModelVersion {
    version: String,
}

#[derive(Debug, Deserialize)]
struct ModelVersionResponse {
    model_version: ModelVersion,
}

#[derive(Debug, Default, Deserialize)]
struct ModelVersionsResponse {
    #[serde(default)]
    model_versions: Vec<ModelVersion>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadUriResponse {
    artifact_uri: String,
}

/// Client for an MLflow tracking server with proxied artifact storage.
#[derive(Debug, Clone)]
pub struct MlflowClient {
    http: reqwest::Client,
    tracking_uri: String,
    health_uri: String,
    probe_timeout: Duration,
}

impl MlflowClient {
    pub fn new(tracking_uri: impl Into<String>) -> Self {
        let tracking_uri = tracking_uri.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            health_uri: tracking_uri.clone(),
            tracking_uri,
            probe_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(&config.tracking_uri)
            .with_health_uri(config.health_base())
            .with_probe_timeout(config.probe_timeout())
    }

    pub fn with_health_uri(mut self, uri: impl Into<String>) -> Self {
        self.health_uri = uri.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn tracking_uri(&self) -> &str {
        &self.tracking_uri
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{path}", self.tracking_uri)
    }

    fn artifacts_url(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow-artifacts/artifacts/{path}", self.tracking_uri)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, IrisError> {
        let resp = self.http.get(self.api(path)).query(query).send().await?;
        decode(path, resp).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, IrisError> {
        let resp = self.http.post(self.api(path)).json(body).send().await?;
        decode(path, resp).await
    }

    async fn experiment_id(&self, name: &str) -> Result<String, IrisError> {
        let resp = self
            .http
            .get(self.api("experiments/get-by-name"))
            .query(&[("experiment_name", name)])
            .send()
            .await?;
        if resp.status() != StatusCode::NOT_FOUND {
            let found: GetExperimentResponse = decode("experiments/get-by-name", resp).await?;
            return Ok(found.experiment.experiment_id);
        }

        debug!(experiment = %name, "Creating experiment");
        let created: CreateExperimentResponse = self
            .post("experiments/create", &json!({ "name": name }))
            .await?;
        Ok(created.experiment_id)
    }

    async fn ensure_registered_model(&self, name: &str) -> Result<(), IrisError> {
        let resp = self
            .http
            .post(self.api("registered-models/create"))
            .json(&json!({ "name": name }))
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body: ApiErrorBody = resp.json().await.unwrap_or_default();
        if body.error_code == "RESOURCE_ALREADY_EXISTS" {
            return Ok(());
        }
        Err(api_error("registered-models/create", status, body))
    }
}

async fn decode<T: DeserializeOwned>(path: &str, resp: reqwest::Response) -> Result<T, IrisError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json::<T>().await?);
    }
    let body: ApiErrorBody = resp.json().await.unwrap_or_default();
    Err(api_error(path, status, body))
}

fn api_error(path: &str, status: StatusCode, body: ApiErrorBody) -> IrisError {
    let code = if body.error_code.is_empty() {
        "UNKNOWN".to_string()
    } else {
        body.error_code
    };
    IrisError::tracking(format!("{path} failed ({status}, {code}): {}", body.message))
}

/// Strip the `mlflow-artifacts:` scheme (and optional authority) from an
/// artifact URI, leaving the path the artifact proxy serves it under.
fn artifact_repo_path(uri: &str) -> Result<String, IrisError> {
    let rest = uri.strip_prefix(ARTIFACTS_SCHEME).ok_or_else(|| {
        IrisError::tracking(format!(
            "artifact location '{uri}' is not served through the tracking server"
        ))
    })?;
    let path = match rest.strip_prefix("//") {
        Some(with_authority) => with_authority
            .split_once('/')
            .map(|(_, p)| p)
            .unwrap_or_default(),
        None => rest.trim_start_matches('/'),
    };
    Ok(path.trim_end_matches('/').to_string())
}

fn parse_version(raw: &str) -> Result<u64, IrisError> {
    raw.parse()
        .map_err(|_| IrisError::registry(format!("non-numeric model version '{raw}'")))
}

#[async_trait]
impl ExperimentTracker for MlflowClient {
    fn backend(&self) -> &'static str {
        "mlflow"
    }

    async fn start_run(&self, experiment: &str, run_name: &str) -> Result<RunHandle, IrisError> {
        let experiment_id = self.experiment_id(experiment).await?;
        let created: RunResponse = self
            .post(
                "runs/create",
                &json!({
                    "experiment_id": experiment_id,
                    "run_name": run_name,
                    "start_time": chrono::Utc::now().timestamp_millis(),
                }),
            )
            .await?;
        Ok(RunHandle {
            run_id: created.run.info.run_id,
            experiment_id,
            artifact_uri: created.run.info.artifact_uri,
        })
    }

    async fn log_params(
        &self,
        run: &RunHandle,
        params: &[(String, String)],
    ) -> Result<(), IrisError> {
        let params: Vec<_> = params
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v }))
            .collect();
        let _: serde_json::Value = self
            .post(
                "runs/log-batch",
                &json!({ "run_id": run.run_id, "params": params }),
            )
            .await?;
        Ok(())
    }

    async fn log_metrics(
        &self,
        run: &RunHandle,
        metrics: &[(String, f64)],
    ) -> Result<(), IrisError> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let metrics: Vec<_> = metrics
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v, "timestamp": timestamp, "step": 0 }))
            .collect();
        let _: serde_json::Value = self
            .post(
                "runs/log-batch",
                &json!({ "run_id": run.run_id, "metrics": metrics }),
            )
            .await?;
        Ok(())
    }

    async fn log_model(
        &self,
        run: &RunHandle,
        artifact_path: &str,
        artifact: &ModelArtifact,
    ) -> Result<String, IrisError> {
        let run_path = artifact_repo_path(&run.artifact_uri)?;
        let url = self.artifacts_url(&format!("{run_path}/{artifact_path}/{ARTIFACT_FILE_NAME}"));
        let resp = self
            .http
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(artifact.to_json_bytes()?)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body: ApiErrorBody = resp.json().await.unwrap_or_default();
            return Err(api_error("mlflow-artifacts upload", status, body));
        }
        Ok(format!(
            "{}/{artifact_path}",
            run.artifact_uri.trim_end_matches('/')
        ))
    }

    async fn register_model(
        &self,
        name: &str,
        source: &str,
        run: &RunHandle,
    ) -> Result<u64, IrisError> {
        self.ensure_registered_model(name).await?;
        let created: ModelVersionResponse = self
            .post(
                "model-versions/create",
                &json!({ "name": name, "source": source, "run_id": run.run_id }),
            )
            .await?;
        parse_version(&created.model_version.version)
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<u64>, IrisError> {
        let filter = format!("name='{name}'");
        let mut versions = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("filter", filter.as_str())];
            if let Some(token) = page_token.as_deref() {
                query.push(("page_token", token));
            }
            let page: ModelVersionsResponse = self.get("model-versions/search", &query).await?;
            for mv in &page.model_versions {
                versions.push(parse_version(&mv.version)?);
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(versions)
    }

    async fn end_run(&self, run: &RunHandle, status: RunStatus) -> Result<(), IrisError> {
        let _: serde_json::Value = self
            .post(
                "runs/update",
                &json!({
                    "run_id": run.run_id,
                    "status": status.as_str(),
                    "end_time": chrono::Utc::now().timestamp_millis(),
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ModelRegistry for MlflowClient {
    async fn is_available(&self) -> bool {
        let url = format!("{}/health", self.health_uri);
        match self.http.get(&url).timeout(self.probe_timeout).send().await {
            Ok(resp) => {
                let healthy = resp.status() == StatusCode::OK;
                if !healthy {
                    debug!(
                        status = %resp.status(),
                        url = %url,
                        "Registry health check returned non-200"
                    );
                }
                healthy
            }
            Err(e) => {
                debug!(error = %e, url = %url, "Registry health probe failed");
                false
            }
        }
    }

    async fn load_latest(&self, name: &str) -> Result<LoadedModel, IrisError> {
        let latest: ModelVersionsResponse = self
            .post(
                "registered-models/get-latest-versions",
                &json!({ "name": name }),
            )
            .await?;
        let mut versions = Vec::with_capacity(latest.model_versions.len());
        for mv in &latest.model_versions {
            versions.push(parse_version(&mv.version)?);
        }
        let version = versions
            .into_iter()
            .max()
            .ok_or_else(|| IrisError::not_found(format!("no versions registered under '{name}'")))?;

        let version_str = version.to_string();
        let download: DownloadUriResponse = self
            .get(
                "model-versions/get-download-uri",
                &[("name", name), ("version", version_str.as_str())],
            )
            .await?;
        let path = artifact_repo_path(&download.artifact_uri)?;

        let resp = self
            .http
            .get(self.artifacts_url(&format!("{path}/{ARTIFACT_FILE_NAME}")))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IrisError::registry(format!(
                "artifact download for {name} v{version} failed ({status})"
            )));
        }
        let bytes = resp.bytes().await?;
        let artifact = ModelArtifact::from_json_slice(&bytes)?;
        Ok(LoadedModel { artifact, version })
    }
}
