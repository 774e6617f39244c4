//! Model reference grammar.
//!
//! A model entry names its artifact with one of three forms:
//!
//! ```text
//! <name>
//! file://<path>:<sha256-hex-64>
//! s3://<bucket>/<key>:<sha256-hex-64>
//! ```
//!
//! For `file` and `s3` the digest is split off at the **last** colon, so
//! paths and keys may themselves contain colons.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use model_store::S3Location;
use serde::{Deserialize, Serialize};

use crate::digest::Sha256Digest;
use crate::error::{ResolveError, Result};

/// Resolution path selected by a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    LocalName,
    File,
    S3,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scheme::LocalName => "local-name",
            Scheme::File => "file",
            Scheme::S3 => "s3",
        })
    }
}

/// A parsed model reference.
///
/// `File` and `S3` references may be parsed without a digest so that the
/// resolver can reject them with [`ResolveError::MissingDigest`]; they are
/// never fetched in that state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelReference {
    /// Model in the operator's local model directory, trusted by location.
    LocalName { name: String },
    /// Model file on the local filesystem.
    File {
        path: PathBuf,
        digest: Option<Sha256Digest>,
    },
    /// Model object in an S3 bucket.
    S3 {
        location: S3Location,
        digest: Option<Sha256Digest>,
    },
}

impl ModelReference {
    /// Parse a reference string.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |reason: String| ResolveError::InvalidReferenceFormat {
            reference: text.to_string(),
            reason,
        };

        if let Some((scheme, rest)) = text.split_once("://") {
            return match scheme {
                "file" => {
                    let (path, digest) = split_digest(rest).map_err(invalid)?;
                    if path.is_empty() {
                        return Err(invalid(
                            "empty path; expected file://<path>:<sha256>".to_string(),
                        ));
                    }
                    Ok(ModelReference::File {
                        path: PathBuf::from(path),
                        digest,
                    })
                }
                "s3" => {
                    let (object, digest) = split_digest(rest).map_err(invalid)?;
                    match object.split_once('/') {
                        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                            Ok(ModelReference::S3 {
                                location: S3Location::new(bucket, key),
                                digest,
                            })
                        }
                        _ => Err(invalid(
                            "expected s3://<bucket>/<key>:<sha256>".to_string(),
                        )),
                    }
                }
                other => Err(invalid(format!(
                    "unsupported scheme {other:?}; expected file:// or s3://"
                ))),
            };
        }

        if text.contains(':') {
            return Err(invalid(
                "a bare model name cannot carry a digest; use file:// or s3://".to_string(),
            ));
        }
        validate_name(text).map_err(invalid)?;
        Ok(ModelReference::LocalName {
            name: text.to_string(),
        })
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            ModelReference::LocalName { .. } => Scheme::LocalName,
            ModelReference::File { .. } => Scheme::File,
            ModelReference::S3 { .. } => Scheme::S3,
        }
    }

    /// Expected digest, if the reference carries one.
    pub fn digest(&self) -> Option<&Sha256Digest> {
        match self {
            ModelReference::LocalName { .. } => None,
            ModelReference::File { digest, .. } | ModelReference::S3 { digest, .. } => {
                digest.as_ref()
            }
        }
    }

    /// Whether this reference must be verified against a digest.
    pub fn requires_digest(&self) -> bool {
        !matches!(self, ModelReference::LocalName { .. })
    }

    /// The expected digest of a `file`/`s3` reference, or `MissingDigest`.
    ///
    /// Local names never need one and yield `Ok(None)`.
    pub fn required_digest(&self) -> Result<Option<Sha256Digest>> {
        if !self.requires_digest() {
            return Ok(None);
        }
        match self.digest() {
            Some(d) => Ok(Some(*d)),
            None => Err(ResolveError::MissingDigest {
                reference: self.to_string(),
            }),
        }
    }
}

/// Split `<body>:<digest>` at the last colon.
fn split_digest(rest: &str) -> std::result::Result<(&str, Option<Sha256Digest>), String> {
    match rest.rsplit_once(':') {
        None => Ok((rest, None)),
        Some((body, tail)) => tail
            .parse::<Sha256Digest>()
            .map(|d| (body, Some(d)))
            .map_err(|_| {
                format!("digest must be exactly 64 lowercase hex characters, got {tail:?}")
            }),
    }
}

fn validate_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("empty model name".to_string());
    }
    if name.starts_with('.') {
        return Err("model name cannot start with '.'".to_string());
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(format!("invalid character {c:?} in model name"));
    }
    Ok(())
}

impl FromStr for ModelReference {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digest = match self {
            ModelReference::LocalName { name } => return f.write_str(name),
            ModelReference::File { path, digest } => {
                write!(f, "file://{}", path.display())?;
                digest
            }
            ModelReference::S3 { location, digest } => {
                write!(f, "{location}")?;
                digest
            }
        };
        match digest {
            Some(d) => write!(f, ":{d}"),
            None => Ok(()),
        }
    }
}
