//! Batch deletion using the S3 DeleteObjects API.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::storage::Storage;

use super::{DeleteResult, Deleter, FailedKey};

/// Maximum objects per batch DeleteObjects API call (S3 limit).
pub const MAX_BATCH_SIZE: usize = 1000;

/// Per-key DeleteObjects error codes worth a second try with DeleteObject.
pub(crate) fn is_retryable_error_code(code: &str) -> bool {
    matches!(
        code,
        "InternalError" | "SlowDown" | "ServiceUnavailable" | "RequestTimeout" | "unknown"
    )
}

/// Deletes a chunk of keys with one DeleteObjects call.
///
/// Keys rejected with a transient code fall back to a single DeleteObject,
/// which goes through the storage retry layer. Other per-key errors are
/// recorded as failed.
pub struct BatchDeleter {
    source: Storage,
}

impl BatchDeleter {
    pub fn new(source: Storage) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Deleter for BatchDeleter {
    async fn delete(&self, keys: &[String]) -> Result<DeleteResult> {
        let mut result = DeleteResult::default();
        if keys.is_empty() {
            return Ok(result);
        }

        debug!(batch_size = keys.len(), "sending DeleteObjects batch request.");

        let outcome = self.source.delete_objects(keys).await?;
        result.deleted.extend(outcome.deleted);

        for error in outcome.errors {
            if is_retryable_error_code(&error.code) {
                match self.source.delete_object(&error.key).await {
                    Ok(()) => {
                        debug!(key = error.key, "DeleteObject fallback succeeded.");
                        result.deleted.push(error.key);
                    }
                    Err(e) => {
                        warn!(
                            key = error.key,
                            code = error.code,
                            error = format!("{e:#}"),
                            "S3 DeleteObject fallback failed for key '{}'.",
                            error.key,
                        );
                        result.failed.push(FailedKey::from_error(&error.key, &e));
                    }
                }
                continue;
            }

            warn!(
                key = error.key,
                code = error.code,
                message = error.message,
                "S3 DeleteObjects partial failure for key '{}': {} ({}).",
                error.key,
                error.code,
                error.message,
            );
            result.failed.push(FailedKey {
                key: error.key,
                error_code: error.code,
                error_message: error.message,
            });
        }

        debug!(
            deleted = result.deleted.len(),
            failed = result.failed.len(),
            "DeleteObjects batch completed."
        );

        Ok(result)
    }
}
