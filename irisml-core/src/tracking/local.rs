//! File-backed tracker for runs without a tracking server.
//!
//! Layout under the root directory (default `./mlruns`):
//!
//! ```text
//! <experiment>/<run_id>/meta.json
//! <experiment>/<run_id>/params.json
//! <experiment>/<run_id>/metrics.json
//! <experiment>/<run_id>/artifacts/<artifact_path>/model.json
//! models/<name>/version-<n>/model.json
//! models/<name>/version-<n>/meta.json
//! ```

use super::{ExperimentTracker, LoadedModel, ModelRegistry, RunHandle, RunStatus};
use crate::artifact::{ARTIFACT_FILE_NAME, ModelArtifact};
use crate::error::IrisError;
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default root directory.
pub const DEFAULT_ROOT: &str = "mlruns";

const VERSION_PREFIX: &str = "version-";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunMeta {
    run_id: String,
    run_name: String,
    experiment: String,
    status: String,
    start_time: i64,
    end_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VersionMeta {
    name: String,
    version: u64,
    source: String,
    run_id: String,
    created_at: i64,
}

/// Directory-backed [`ExperimentTracker`] and [`ModelRegistry`].
#[derive(Debug, Clone)]
pub struct LocalTracker {
    root: PathBuf,
}

impl LocalTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run: &RunHandle) -> PathBuf {
        self.root.join(&run.experiment_id).join(&run.run_id)
    }

    fn model_dir(&self, name: &str) -> PathBuf {
        self.root.join("models").join(name)
    }

    fn version_dir(&self, name: &str, version: u64) -> PathBuf {
        self.model_dir(name).join(format!("{VERSION_PREFIX}{version}"))
    }

    fn update_run_meta(
        &self,
        run: &RunHandle,
        f: impl FnOnce(&mut RunMeta),
    ) -> Result<(), IrisError> {
        let path = self.run_dir(run).join("meta.json");
        let mut meta: RunMeta = read_json(&path)?
            .ok_or_else(|| IrisError::not_found(format!("run {}", run.run_id)))?;
        f(&mut meta);
        write_json(&path, &meta)
    }

    fn merge_into<V: Serialize + DeserializeOwned>(
        &self,
        run: &RunHandle,
        file: &str,
        entries: impl IntoIterator<Item = (String, V)>,
    ) -> Result<(), IrisError> {
        let path = self.run_dir(run).join(file);
        let mut map: BTreeMap<String, V> = read_json(&path)?.unwrap_or_default();
        map.extend(entries);
        write_json(&path, &map)
    }
}

impl Default for LocalTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, IrisError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), IrisError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl ExperimentTracker for LocalTracker {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn start_run(&self, experiment: &str, run_name: &str) -> Result<RunHandle, IrisError> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let handle = RunHandle {
            experiment_id: experiment.to_string(),
            artifact_uri: self
                .root
                .join(experiment)
                .join(&run_id)
                .join("artifacts")
                .display()
                .to_string(),
            run_id,
        };
        let meta = RunMeta {
            run_id: handle.run_id.clone(),
            run_name: run_name.to_string(),
            experiment: experiment.to_string(),
            status: "RUNNING".to_string(),
            start_time: Utc::now().timestamp_millis(),
            end_time: None,
        };
        write_json(&self.run_dir(&handle).join("meta.json"), &meta)?;
        Ok(handle)
    }

    async fn log_params(
        &self,
        run: &RunHandle,
        params: &[(String, String)],
    ) -> Result<(), IrisError> {
        self.merge_into(run, "params.json", params.iter().cloned())
    }

    async fn log_metrics(
        &self,
        run: &RunHandle,
        metrics: &[(String, f64)],
    ) -> Result<(), IrisError> {
        self.merge_into(run, "metrics.json", metrics.iter().cloned())
    }

    async fn log_model(
        &self,
        run: &RunHandle,
        artifact_path: &str,
        artifact: &ModelArtifact,
    ) -> Result<String, IrisError> {
        let dir = PathBuf::from(&run.artifact_uri).join(artifact_path);
        artifact.save(&dir.join(ARTIFACT_FILE_NAME))?;
        Ok(dir.display().to_string())
    }

    async fn register_model(
        &self,
        name: &str,
        source: &str,
        run: &RunHandle,
    ) -> Result<u64, IrisError> {
        let artifact = ModelArtifact::load(&Path::new(source).join(ARTIFACT_FILE_NAME))?;
        let version = self.list_versions(name).await?.into_iter().max().unwrap_or(0) + 1;
        let dir = self.version_dir(name, version);
        artifact.save(&dir.join(ARTIFACT_FILE_NAME))?;
        write_json(
            &dir.join("meta.json"),
            &VersionMeta {
                name: name.to_string(),
                version,
                source: source.to_string(),
                run_id: run.run_id.clone(),
                created_at: Utc::now().timestamp_millis(),
            },
        )?;
        Ok(version)
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<u64>, IrisError> {
        let dir = self.model_dir(name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(v) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.strip_prefix(VERSION_PREFIX))
                .and_then(|v| v.parse::<u64>().ok())
            {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    async fn end_run(&self, run: &RunHandle, status: RunStatus) -> Result<(), IrisError> {
        self.update_run_meta(run, |meta| {
            meta.status = status.as_str().to_string();
            meta.end_time = Some(Utc::now().timestamp_millis());
        })
    }
}

#[async_trait]
impl ModelRegistry for LocalTracker {
    async fn is_available(&self) -> bool {
        self.root.join("models").is_dir()
    }

    async fn load_latest(&self, name: &str) -> Result<LoadedModel, IrisError> {
        let version = self
            .list_versions(name)
            .await?
            .into_iter()
            .max()
            .ok_or_else(|| {
                IrisError::not_found(format!("no versions registered under '{name}'"))
            })?;
        let path = self.version_dir(name, version).join(ARTIFACT_FILE_NAME);
        let artifact = ModelArtifact::load(&path)?;
        Ok(LoadedModel { artifact, version })
    }
}
