//! In-memory fakes for the object store (testing only)
//!
//! `MemoryObjectStore` serves objects from a `HashMap`, records every call
//! it receives and can be scripted to fail a number of times before
//! answering, or to answer slowly.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::object_store::{ObjectStore, S3Location, StoreResult};

/// In-memory object store backed by a `HashMap<(bucket, key), bytes>`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<S3Location, Vec<u8>>>,
    failures: Mutex<HashMap<S3Location, VecDeque<StoreError>>>,
    calls: Mutex<Vec<S3Location>>,
    delay: Mutex<Option<Duration>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `bucket/key`, replacing any previous object.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .unwrap()
            .insert(S3Location::new(bucket, key), data.into());
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_object(self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) -> Self {
        self.insert(bucket, key, data);
        self
    }

    /// Queue `err` to be returned by the next fetch of `bucket/key`.
    /// Queued errors are consumed in order before the object is served.
    pub fn fail_next(&self, bucket: &str, key: &str, err: StoreError) {
        self.failures
            .lock()
            .unwrap()
            .entry(S3Location::new(bucket, key))
            .or_default()
            .push_back(err);
    }

    /// Sleep for `delay` before answering each request.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Every `get_object` call received, in order.
    pub fn calls(&self) -> Vec<S3Location> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let location = S3Location::new(bucket, key);
        self.calls.lock().unwrap().push(location.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&location)
            .and_then(|queue| queue.pop_front())
        {
            return Err(err);
        }

        self.objects
            .lock()
            .unwrap()
            .get(&location)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}
