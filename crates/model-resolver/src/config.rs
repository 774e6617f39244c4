//! Workflow configuration (`nrt_predict.yaml`).
//!
//! Only the parts that drive model resolution are typed. Anything else on a
//! model entry is kept verbatim in [`ModelEntry::params`] for the model.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use model_store::{ObjectStore, S3Config};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::batch::{BatchOptions, RetryPolicy};
use crate::cache::fs::FsArtifactCache;
use crate::cache::CacheError;
use crate::error::ResolveError;
use crate::local::DEFAULT_MODEL_DIR;
use crate::reference::ModelReference;
use crate::resolver::ModelResolver;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "nrt_predict.yaml";

/// Default output driver for model entries.
pub const DEFAULT_DRIVER: &str = "GTiff";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to open model cache: {0}")]
    Cache(#[from] CacheError),
}

/// Top-level workflow configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Search directory for bare model names
    #[serde(default = "default_modeldir")]
    pub modeldir: PathBuf,

    /// Model-file extensions, highest priority first
    #[serde(default)]
    pub model_extensions: Option<Vec<String>>,

    /// Content-addressed cache for object-store models
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Object-store endpoint; taken from the environment when absent
    #[serde(default)]
    pub s3: Option<S3Config>,

    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

fn default_modeldir() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_DIR)
}

fn default_max_concurrent() -> usize {
    4
}

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

/// One model to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Model reference: `<name>`, `file://<path>:<sha256>` or
    /// `s3://<bucket>/<key>:<sha256>`
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub output: String,

    #[serde(default = "default_driver")]
    pub driver: String,

    #[serde(default)]
    pub inputs: Vec<InputEntry>,

    /// Remaining keys, handed to the model untouched
    #[serde(flatten)]
    pub params: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEntry {
    #[serde(default)]
    pub filename: String,
}

/// A problem found by [`WorkflowConfig::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    NoModels,
    ZeroConcurrency,
    MissingName { index: usize },
    /// Bad reference format or a missing digest
    InvalidModel { error: ResolveError },
    EmptyOutput { reference: String },
    EmptyDriver { reference: String },
    EmptyInputFilename { reference: String, input: usize },
}

impl ConfigIssue {
    /// Reference string of the model entry concerned, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            ConfigIssue::InvalidModel { error } => Some(error.reference()),
            ConfigIssue::EmptyOutput { reference }
            | ConfigIssue::EmptyDriver { reference }
            | ConfigIssue::EmptyInputFilename { reference, .. } => Some(reference),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::NoModels => write!(f, "'models' should be set to a non-empty list"),
            ConfigIssue::ZeroConcurrency => {
                write!(f, "'max_concurrent_fetches' must be at least 1")
            }
            ConfigIssue::MissingName { index } => write!(f, "model #{index} has no 'name'"),
            ConfigIssue::InvalidModel { error } => write!(f, "{error}"),
            ConfigIssue::EmptyOutput { reference } => {
                write!(f, "model {reference:?} has no 'output'")
            }
            ConfigIssue::EmptyDriver { reference } => {
                write!(f, "model {reference:?} has an empty 'driver'")
            }
            ConfigIssue::EmptyInputFilename { reference, input } => {
                write!(f, "model {reference:?} input #{input} has no 'filename'")
            }
        }
    }
}

impl WorkflowConfig {
    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            path = %path.display(),
            models = config.models.len(),
            "loaded workflow configuration"
        );
        Ok(config)
    }

    /// Parse configuration from YAML text.
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Check the configuration, returning every issue found.
    pub fn check(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.models.is_empty() {
            issues.push(ConfigIssue::NoModels);
        }
        if self.max_concurrent_fetches == 0 {
            issues.push(ConfigIssue::ZeroConcurrency);
        }

        for (index, model) in self.models.iter().enumerate() {
            if model.name.is_empty() {
                issues.push(ConfigIssue::MissingName { index });
                continue;
            }
            let reference = &model.name;

            let checked = ModelReference::parse(reference)
                .and_then(|parsed| parsed.required_digest().map(|_| ()));
            if let Err(error) = checked {
                issues.push(ConfigIssue::InvalidModel {
                    error: error.with_reference(reference),
                });
            }

            if model.output.trim().is_empty() {
                issues.push(ConfigIssue::EmptyOutput {
                    reference: reference.clone(),
                });
            }
            if model.driver.trim().is_empty() {
                issues.push(ConfigIssue::EmptyDriver {
                    reference: reference.clone(),
                });
            }
            for (input, entry) in model.inputs.iter().enumerate() {
                if entry.filename.trim().is_empty() {
                    issues.push(ConfigIssue::EmptyInputFilename {
                        reference: reference.clone(),
                        input,
                    });
                }
            }
        }

        for issue in &issues {
            warn!(%issue, "configuration issue");
        }
        debug!(issues = issues.len(), "configuration checked");
        issues
    }

    /// Model reference strings, in configuration order.
    pub fn references(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name.clone()).collect()
    }

    /// Object-store settings, falling back to the environment.
    pub fn s3_config(&self) -> S3Config {
        self.s3.clone().unwrap_or_else(S3Config::from_env)
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            max_concurrent: self.max_concurrent_fetches,
            retry: self.retry.clone(),
        }
    }

    /// Build a resolver using `store` for object-store references.
    pub fn build_resolver(&self, store: Arc<dyn ObjectStore>) -> Result<ModelResolver, ConfigError> {
        let mut resolver = ModelResolver::new(store).with_search_dir(&self.modeldir);
        if let Some(extensions) = &self.model_extensions {
            resolver = resolver.with_extensions(extensions.iter().cloned());
        }
        if let Some(secs) = self.fetch_timeout_secs {
            resolver = resolver.with_fetch_timeout(Duration::from_secs(secs));
        }
        if let Some(dir) = &self.cache_dir {
            let cache = FsArtifactCache::new(dir)?;
            debug!(cache_dir = %dir.display(), "model cache enabled");
            resolver = resolver.with_cache(Arc::new(cache));
        }
        Ok(resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Sha256Digest;
    use crate::error::ErrorKind;
    use model_store::fakes::MemoryObjectStore;

    fn digest() -> String {
        Sha256Digest::compute(b"model").to_hex()
    }

    #[test]
    fn test_defaults_applied() {
        let yaml = format!(
            "models:\n  - name: s3://bucket/veg.pkl:{}\n    output: veg.tif\n",
            digest()
        );
        let config = WorkflowConfig::parse(&yaml).unwrap();

        assert_eq!(config.modeldir, PathBuf::from("models"));
        assert_eq!(config.max_concurrent_fetches, 4);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.cache_dir.is_none());

        let model = &config.models[0];
        assert_eq!(model.driver, "GTiff");
        assert!(model.inputs.is_empty());
        assert!(model.params.is_empty());
        assert!(config.check().is_empty());
    }

    #[test]
    fn test_extra_model_keys_kept_as_params() {
        let yaml = "models:\n  - name: veg\n    output: veg.tif\n    threshold: 0.5\n    bands: [red, nir]\n";
        let config = WorkflowConfig::parse(yaml).unwrap();
        let params = &config.models[0].params;

        assert_eq!(params.len(), 2);
        assert_eq!(params["threshold"], serde_yaml::Value::from(0.5));
        assert!(params["bands"].is_sequence());
    }

    #[test]
    fn test_partial_retry_section() {
        let yaml = "retry:\n  max_retries: 5\nmodels: []\n";
        let config = WorkflowConfig::parse(yaml).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.backoff_base_ms, 500);
    }

    #[test]
    fn test_check_collects_every_issue() {
        let yaml = "max_concurrent_fetches: 0\nmodels:\n  - name: s3://bucket/veg.pkl\n    output: a.tif\n  - name: file://m.pkl:abc\n    output: ''\n  - name: veg\n    output: b.tif\n    driver: ''\n    inputs:\n      - filename: ''\n";
        let config = WorkflowConfig::parse(yaml).unwrap();
        let issues = config.check();

        assert_eq!(issues.len(), 6);
        assert!(issues.contains(&ConfigIssue::ZeroConcurrency));
        assert!(issues.iter().any(|i| matches!(
            i,
            ConfigIssue::InvalidModel { error } if error.kind() == ErrorKind::MissingDigest
                && error.reference() == "s3://bucket/veg.pkl"
        )));
        assert!(issues.iter().any(|i| matches!(
            i,
            ConfigIssue::InvalidModel { error } if error.kind() == ErrorKind::InvalidReferenceFormat
                && error.reference() == "file://m.pkl:abc"
        )));
        assert!(issues.contains(&ConfigIssue::EmptyOutput {
            reference: "file://m.pkl:abc".to_string()
        }));
        assert!(issues.contains(&ConfigIssue::EmptyDriver {
            reference: "veg".to_string()
        }));
        assert!(issues.contains(&ConfigIssue::EmptyInputFilename {
            reference: "veg".to_string(),
            input: 0
        }));
    }

    #[test]
    fn test_check_reports_missing_models() {
        let config = WorkflowConfig::parse("modeldir: /opt/models\n").unwrap();
        assert_eq!(config.check(), vec![ConfigIssue::NoModels]);
    }

    #[test]
    fn test_missing_name_reported_by_index() {
        let config = WorkflowConfig::parse("models:\n  - output: a.tif\n").unwrap();
        let issues = config.check();
        assert_eq!(issues, vec![ConfigIssue::MissingName { index: 0 }]);
        assert_eq!(issues[0].reference(), None);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorkflowConfig::load(dir.path().join("nrt_predict.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_rejects_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nrt_predict.yaml");
        std::fs::write(&path, "models: {name: [unclosed").unwrap();
        let err = WorkflowConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_build_resolver_applies_settings() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            "modeldir: {}\nmodel_extensions: [onnx]\ncache_dir: {}\nmodels: []\n",
            dir.path().join("models").display(),
            dir.path().join("cache").display()
        );
        let config = WorkflowConfig::parse(&yaml).unwrap();
        let resolver = config
            .build_resolver(Arc::new(MemoryObjectStore::new()))
            .unwrap();

        assert_eq!(resolver.search_dir(), dir.path().join("models"));
        assert_eq!(resolver.extensions(), ["onnx".to_string()]);
        assert!(dir.path().join("cache").join("objects").is_dir());
    }

    #[test]
    fn test_explicit_s3_section() {
        let yaml = "s3:\n  endpoint: http://localhost:9000\nmodels: []\n";
        let config = WorkflowConfig::parse(yaml).unwrap();
        let s3 = config.s3_config();
        assert_eq!(s3.region, "ap-southeast-2");
        assert_eq!(s3.endpoint.as_deref(), Some("http://localhost:9000"));
    }
}
