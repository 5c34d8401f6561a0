//! Application-level retry around every object store call.
//!
//! The SDK has its own retry loop, but it gives up on throttling storms and
//! has no hard per-call deadline. This layer adds both: each attempt runs under
//! a timeout, and throttled or transient failures are retried with
//! exponential backoff. Any other failure is returned at once.

use std::future::Future;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use crate::config::ForceRetryConfig;
use crate::storage::{
    BatchDeleteOutcome, ListingPage, Storage, StorageTrait, UploadAck, UploadBody,
};
use crate::types::error::{StorageError, storage_error_of};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub operation_deadline: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based): doubles each time and
    /// never exceeds `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl From<&ForceRetryConfig> for RetryPolicy {
    fn from(config: &ForceRetryConfig) -> Self {
        Self {
            max_retries: config.force_retry_count,
            initial_backoff: Duration::from_millis(config.force_retry_interval_milliseconds),
            max_backoff: Duration::from_millis(config.max_backoff_milliseconds),
            operation_deadline: Duration::from_millis(config.operation_deadline_milliseconds),
        }
    }
}

pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    target: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        let result = match tokio::time::timeout(policy.operation_deadline, call()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(StorageError::TransientNetwork(format!(
                "{operation} did not complete within {} ms",
                policy.operation_deadline.as_millis()
            )))),
        };

        let e = match result {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let retryable = storage_error_of(&e).is_some_and(StorageError::is_retryable);
        if !retryable || policy.max_retries <= attempt {
            return Err(e);
        }

        let backoff = policy.backoff_for(attempt);
        attempt += 1;

        warn!(
            operation = operation,
            target = target,
            attempt = attempt,
            max_retries = policy.max_retries,
            backoff_milliseconds = backoff.as_millis() as u64,
            error = format!("{e:#}"),
            "retrying after retryable failure."
        );

        tokio::time::sleep(backoff).await;
    }
}

/// Decorator that applies a [`RetryPolicy`] to every call of the wrapped
/// storage.
#[derive(Clone)]
pub struct RetryingStorage {
    inner: Storage,
    policy: RetryPolicy,
}

impl RetryingStorage {
    pub fn boxed(inner: Storage, policy: RetryPolicy) -> Storage {
        Box::new(Self { inner, policy })
    }
}

#[async_trait]
impl StorageTrait for RetryingStorage {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    async fn head_bucket(&self) -> Result<()> {
        with_retry(&self.policy, "head_bucket", self.inner.bucket(), || {
            self.inner.head_bucket()
        })
        .await
    }

    async fn list_objects(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ListingPage> {
        with_retry(&self.policy, "list_objects", self.inner.bucket(), || {
            self.inner
                .list_objects(prefix, continuation_token.clone(), max_keys)
        })
        .await
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        with_retry(&self.policy, "get_object", key, || self.inner.get_object(key)).await
    }

    async fn put_object(
        &self,
        key: &str,
        body: UploadBody,
        content_type: &str,
    ) -> Result<UploadAck> {
        with_retry(&self.policy, "put_object", key, || {
            self.inner.put_object(key, body.clone(), content_type)
        })
        .await
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        with_retry(&self.policy, "delete_object", key, || {
            self.inner.delete_object(key)
        })
        .await
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<BatchDeleteOutcome> {
        with_retry(&self.policy, "delete_objects", self.inner.bucket(), || {
            self.inner.delete_objects(keys)
        })
        .await
    }
}
