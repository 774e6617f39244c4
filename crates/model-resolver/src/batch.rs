//! Concurrent resolution of every configured model entry.
//!
//! One task per entry, bounded by a semaphore. Entries never affect each
//! other: a failure is recorded in that entry's outcome and its siblings
//! carry on. Transient fetch failures are retried here with exponential
//! backoff; every other error is final on the first attempt.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::artifact::{ArtifactSummary, VerifiedArtifact};
use crate::error::{ErrorKind, ResolveError, Result};
use crate::resolver::ModelResolver;

/// Retry policy for transient fetch failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries (0 = run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: 0,
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt`
    /// (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Options for [`resolve_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum number of entries resolved at once.
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of resolving one model entry.
#[derive(Debug)]
pub struct EntryOutcome {
    /// The reference string as configured
    pub reference: String,
    /// Attempts made (1 = no retries used)
    pub attempts: u32,
    pub result: Result<VerifiedArtifact>,
}

impl EntryOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn report(&self) -> EntryReport {
        match &self.result {
            Ok(artifact) => EntryReport {
                reference: self.reference.clone(),
                attempts: self.attempts,
                artifact: Some(artifact.summary()),
                error: None,
            },
            Err(err) => EntryReport {
                reference: self.reference.clone(),
                attempts: self.attempts,
                artifact: None,
                error: Some(ErrorReport {
                    kind: err.kind(),
                    message: err.to_string(),
                }),
            },
        }
    }
}

/// Serializable form of an [`EntryOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryReport {
    pub reference: String,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

/// Resolve `text`, retrying transient failures per `policy`.
///
/// Returns the final result and the number of attempts made.
pub async fn resolve_with_retry(
    resolver: &ModelResolver,
    text: &str,
    policy: &RetryPolicy,
) -> (Result<VerifiedArtifact>, u32) {
    let max_attempts = policy.max_retries + 1;
    let mut attempt = 1;
    loop {
        match resolver.resolve(text).await {
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    reference = text,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient fetch failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return (result, attempt),
        }
    }
}

/// Resolve every reference concurrently. Outcomes are returned in input
/// order.
pub async fn resolve_all(
    resolver: &ModelResolver,
    references: Vec<String>,
    options: &BatchOptions,
) -> Vec<EntryOutcome> {
    info!(
        entries = references.len(),
        max_concurrent = options.max_concurrent,
        "resolving model entries"
    );

    // Semaphore enforces max_concurrent
    let sem = Arc::new(Semaphore::new(options.max_concurrent.max(1)));

    let tasks: Vec<_> = references
        .iter()
        .cloned()
        .map(|text| {
            let resolver = resolver.clone();
            let retry = options.retry.clone();
            let sem = Arc::clone(&sem);
            tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let (result, attempts) = resolve_with_retry(&resolver, &text, &retry).await;
                EntryOutcome {
                    reference: text,
                    attempts,
                    result,
                }
            })
        })
        .collect();

    let outcomes: Vec<EntryOutcome> = join_all(tasks)
        .await
        .into_iter()
        .zip(references)
        .map(|(joined, text)| match joined {
            Ok(outcome) => outcome,
            Err(join_err) => {
                error!(reference = %text, error = %join_err, "resolution task failed");
                EntryOutcome {
                    result: Err(ResolveError::ArtifactUnreadable {
                        reference: text.clone(),
                        reason: format!("resolution task failed: {join_err}"),
                    }),
                    reference: text,
                    attempts: 1,
                }
            }
        })
        .collect();

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    info!(
        resolved = outcomes.len() - failed,
        failed,
        "model entries resolved"
    );
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.backoff_base_ms, 500);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff_base_ms: 100,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy {
            max_retries: 100,
            backoff_base_ms: u64::MAX / 2,
        };
        assert_eq!(policy.delay_for(80), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_retry_policy_serde_roundtrip() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base_ms: 250,
        };
        let json = serde_json::to_string(&policy).unwrap();
        let back: RetryPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, back);
    }
}
