//! Anonymous S3 client over HTTPS
//!
//! Public model buckets are read without request signing, so a plain GET
//! against the bucket endpoint is all that is needed. Private buckets plug
//! in a different [`ObjectStore`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::object_store::{ObjectStore, StoreResult};

const DEFAULT_REGION: &str = "ap-southeast-2";

/// S3 endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    /// Region used to build the virtual-hosted endpoint
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint (path-style addressing), e.g. a local MinIO
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Whole-request timeout applied by the HTTP client
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for S3Config {
    fn default() -> Self {
        S3Config {
            region: std::env::var("AWS_REGION")
                .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
                .unwrap_or_else(|_| default_region()),
            endpoint: std::env::var("AWS_ENDPOINT_URL").ok(),
            timeout_secs: None,
        }
    }
}

impl S3Config {
    /// Create a config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific region
    pub fn new(region: &str) -> Self {
        S3Config {
            region: region.to_string(),
            endpoint: None,
            timeout_secs: None,
        }
    }

    /// Use path-style requests against a custom endpoint
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    /// Set the HTTP request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }
}

/// Object store reading public S3 buckets with unsigned requests
pub struct S3HttpStore {
    config: S3Config,
    http_client: reqwest::Client,
}

impl S3HttpStore {
    /// Create a new client
    pub fn new(config: S3Config) -> StoreResult<Self> {
        let mut builder =
            reqwest::Client::builder().user_agent(concat!("nrt-models/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder
            .build()
            .map_err(|e| StoreError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(S3HttpStore {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> StoreResult<Self> {
        Self::new(S3Config::from_env())
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// URL of `bucket/key`, with each key segment percent-encoded.
    pub fn object_url(&self, bucket: &str, key: &str) -> StoreResult<Url> {
        let base = match &self.config.endpoint {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", bucket, self.config.region),
        };
        let mut url =
            Url::parse(&base).map_err(|e| StoreError::Config(format!("bad endpoint {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Config(format!("endpoint cannot carry a path: {base}")))?
            .pop_if_empty()
            .extend(key.split('/'));
        Ok(url)
    }
}

/// Map a non-success HTTP status onto the store error taxonomy.
pub fn classify_status(status: StatusCode, bucket: &str, key: &str) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::AccessDenied {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            StoreError::Transient(format!("{status} for s3://{bucket}/{key}"))
        }
        s if s.is_server_error() => StoreError::Transient(format!("{s} for s3://{bucket}/{key}")),
        s => StoreError::Transport(format!("unexpected status {s} for s3://{bucket}/{key}")),
    }
}

#[async_trait]
impl ObjectStore for S3HttpStore {
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let url = self.object_url(bucket, key)?;
        debug!(%url, "GET object");

        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, bucket, key, "object fetch refused");
            return Err(classify_status(status, bucket, key));
        }

        let body = response.bytes().await?;
        debug!(bucket, key, size = body.len(), "object fetched");
        Ok(body.to_vec())
    }
}
