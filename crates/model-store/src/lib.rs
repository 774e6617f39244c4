//! Model-Store: object-store access for NRT model artifacts
//!
//! This crate is the storage boundary of the model resolver. It defines the
//! single capability the resolver consumes from an object store and ships
//! two implementations of it.
//!
//! ## Key Components
//!
//! - `ObjectStore`: fetch the full body of `bucket/key`
//! - `S3HttpStore`: anonymous GET against public S3 buckets
//! - `fakes::MemoryObjectStore`: in-memory store that records calls

mod error;
pub mod fakes;
pub mod object_store;
pub mod s3_http;

pub use error::StoreError;
pub use object_store::{ObjectStore, S3Location, StoreResult};
pub use s3_http::{classify_status, S3Config, S3HttpStore};
