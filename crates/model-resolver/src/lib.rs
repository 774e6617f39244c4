//! Model Resolver
//!
//! Turns a model reference string from a workflow configuration into the
//! model's raw bytes, refusing anything fetched from outside the trusted
//! model directory unless its SHA-256 matches the digest in the reference.
//!
//! ```text
//! <name>                          looked up in the model directory
//! file://<path>:<sha256>          read from disk, verified
//! s3://<bucket>/<key>:<sha256>    fetched from the object store, verified
//! ```

pub mod artifact;
pub mod batch;
pub mod cache;
pub mod config;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod local;
pub mod reference;
pub mod resolver;
pub mod telemetry;
pub mod verify;

pub use artifact::{ArtifactOrigin, ArtifactSummary, VerifiedArtifact};
pub use batch::{
    resolve_all, resolve_with_retry, BatchOptions, EntryOutcome, EntryReport, ErrorReport,
    RetryPolicy,
};
pub use cache::fs::FsArtifactCache;
pub use cache::{ArtifactCache, CacheError};
pub use config::{ConfigError, ConfigIssue, InputEntry, ModelEntry, WorkflowConfig};
pub use digest::{InvalidDigest, Sha256Digest};
pub use error::{ErrorKind, ResolveError, Result};
pub use fetch::Fetcher;
pub use local::{find_local, find_local_with, DEFAULT_MODEL_DIR, MODEL_EXTENSIONS};
pub use reference::{ModelReference, Scheme};
pub use resolver::ModelResolver;
pub use telemetry::init_tracing;
pub use verify::{check_digest, verify};
