//! Configuration for the prediction service.
//!
//! Uses `figment` for layered configuration: defaults -> `irisml.toml` ->
//! environment (`IRISML_SERVER__PORT`, `IRISML_REGISTRY__TRACKING_URI`, ...).

use crate::error::IrisError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "irisml.toml";

/// Logical name the training job registers the model under.
pub const DEFAULT_MODEL_NAME: &str = "iris_classifier_model";

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Which store backs the model registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// MLflow tracking server at `tracking_uri`.
    #[default]
    Mlflow,
    /// On-disk store under `local_root`, as written by the training job when
    /// no tracking URI is given.
    Local,
}

/// Model registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Skip the registry entirely and go straight to the local file.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub backend: RegistryBackend,
    /// Root of the on-disk store used by the `local` backend.
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
    /// Base URI of the tracking server used for model lookups.
    #[serde(default = "default_tracking_uri")]
    pub tracking_uri: String,
    /// Base URI probed at `/health`; falls back to `tracking_uri`.
    #[serde(default)]
    pub health_uri: Option<String>,
    /// Registered model name resolved at its latest version.
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Timeout for the startup health probe (seconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: RegistryBackend::default(),
            local_root: default_local_root(),
            tracking_uri: default_tracking_uri(),
            health_uri: None,
            model_name: default_model_name(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl RegistryConfig {
    pub fn health_base(&self) -> &str {
        self.health_uri.as_deref().unwrap_or(&self.tracking_uri)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_local_root() -> PathBuf {
    PathBuf::from(crate::tracking::local::DEFAULT_ROOT)
}

fn default_tracking_uri() -> String {
    "http://localhost:5001".to_string()
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

fn default_probe_timeout() -> u64 {
    5
}

/// Local artifact fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
        }
    }
}

fn default_local_path() -> PathBuf {
    PathBuf::from(crate::artifact::DEFAULT_LOCAL_PATH)
}

/// Prediction log sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Append-only log file receiving request and prediction events.
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    /// Level filter for the log file.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            level: default_log_level(),
        }
    }
}

fn default_log_file() -> PathBuf {
    PathBuf::from("prediction.log")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load the service configuration.
///
/// `path` overrides the default `irisml.toml`; a missing file is skipped.
pub fn load_config(path: Option<&Path>) -> Result<ServeConfig, IrisError> {
    let mut figment = Figment::from(Serialized::defaults(ServeConfig::default()));

    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    if file.exists() {
        figment = figment.merge(Toml::file(file));
    }

    figment = figment.merge(Env::prefixed("IRISML_").split("__"));

    figment.extract().map_err(|e| IrisError::from(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServeConfig::default();
        assert_eq!(config.server.bind_addr(), "0.0.0.0:8000");
        assert!(config.registry.enabled);
        assert_eq!(config.registry.backend, RegistryBackend::Mlflow);
        assert_eq!(config.registry.local_root, PathBuf::from("mlruns"));
        assert_eq!(config.registry.tracking_uri, "http://localhost:5001");
        assert_eq!(config.registry.health_base(), "http://localhost:5001");
        assert_eq!(config.registry.model_name, "iris_classifier_model");
        assert_eq!(config.registry.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.model.local_path, PathBuf::from("iris_model.json"));
        assert_eq!(config.logging.file, PathBuf::from("prediction.log"));
    }

    #[test]
    fn test_health_uri_override() {
        let registry = RegistryConfig {
            health_uri: Some("http://localhost:5005".into()),
            ..RegistryConfig::default()
        };
        assert_eq!(registry.health_base(), "http://localhost:5005");
    }

    #[test]
    fn test_load_config_layers_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "irisml.toml",
                r#"
                [server]
                port = 9000

                [registry]
                tracking_uri = "http://mlflow:5000"
                "#,
            )?;
            jail.set_env("IRISML_REGISTRY__ENABLED", "false");
            jail.set_env("IRISML_MODEL__LOCAL_PATH", "/models/iris.json");

            let config = load_config(None).expect("config should load");
            assert_eq!(config.server.port, 9000);
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.registry.tracking_uri, "http://mlflow:5000");
            assert!(!config.registry.enabled);
            assert_eq!(config.model.local_path, PathBuf::from("/models/iris.json"));
            Ok(())
        });
    }

    #[test]
    fn test_load_config_selects_local_backend() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "irisml.toml",
                r#"
                [registry]
                backend = "local"
                local_root = "/srv/mlruns"
                "#,
            )?;
            let config = load_config(None).expect("config should load");
            assert_eq!(config.registry.backend, RegistryBackend::Local);
            assert_eq!(config.registry.local_root, PathBuf::from("/srv/mlruns"));

            jail.set_env("IRISML_REGISTRY__BACKEND", "mlflow");
            let config = load_config(None).expect("env should override file");
            assert_eq!(config.registry.backend, RegistryBackend::Mlflow);

            jail.set_env("IRISML_REGISTRY__BACKEND", "sqlite");
            assert!(load_config(None).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_load_config_without_file() {
        figment::Jail::expect_with(|_jail| {
            let config = load_config(None).expect("defaults should load");
            assert_eq!(config.server.port, 8000);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_rejects_bad_types() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("IRISML_SERVER__PORT", "not-a-port");
            let err = load_config(None).unwrap_err();
            assert!(matches!(err, IrisError::Config(_)));
            Ok(())
        });
    }
}
