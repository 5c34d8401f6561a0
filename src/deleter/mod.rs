//! Deletion of archived originals.
//!
//! Only keys that made it into an uploaded archive are ever passed here. The
//! [`OriginalsDeleter`] walks them oldest first, in chunks, and hands each
//! chunk to a [`Deleter`] backend: [`BatchDeleter`] (DeleteObjects) or
//! [`SingleDeleter`] (DeleteObject) when the batch size is 1. A key that
//! cannot be deleted is recorded and the run goes on.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::stage::Stage;
use crate::types::ArchiveStatistics;
use crate::types::error::{StorageError, storage_error_of};

pub mod batch;
pub mod single;

pub use batch::BatchDeleter;
pub use single::SingleDeleter;

/// Result of a deletion operation, reporting which keys succeeded and which failed.
#[derive(Debug, Clone, Default)]
pub struct DeleteResult {
    pub deleted: Vec<String>,
    pub failed: Vec<FailedKey>,
}

impl DeleteResult {
    fn merge(&mut self, other: DeleteResult) {
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
    }
}

/// A key that failed to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedKey {
    pub key: String,
    pub error_code: String,
    pub error_message: String,
}

impl FailedKey {
    pub(crate) fn from_error(key: &str, e: &anyhow::Error) -> Self {
        Self {
            key: key.to_string(),
            error_code: error_code_of(e).to_string(),
            error_message: format!("{e:#}"),
        }
    }
}

/// Trait for deletion backends (batch or single mode).
#[async_trait]
pub trait Deleter: Send + Sync {
    /// Delete one chunk of keys. Per-key failures are reported in the
    /// result, not as an error.
    async fn delete(&self, keys: &[String]) -> Result<DeleteResult>;
}

fn error_code_of(e: &anyhow::Error) -> &'static str {
    match storage_error_of(e) {
        Some(StorageError::NotFound(_)) => "NotFound",
        Some(StorageError::AccessDenied(_)) => "AccessDenied",
        Some(StorageError::Throttled(_)) => "Throttled",
        Some(StorageError::TransientNetwork(_)) => "TransientNetwork",
        Some(StorageError::Permanent(_)) => "Permanent",
        None => "unknown",
    }
}

/// Deletes the archived originals from the source bucket.
pub struct OriginalsDeleter {
    stage: Stage,
    deleter: Box<dyn Deleter>,
    chunk_size: usize,
}

impl OriginalsDeleter {
    pub fn new(stage: Stage) -> Self {
        let source = stage.source.clone();
        let (deleter, chunk_size): (Box<dyn Deleter>, usize) = if stage.config.batch_size <= 1 {
            (Box::new(SingleDeleter::new(source)), 1)
        } else {
            (
                Box::new(BatchDeleter::new(source)),
                usize::from(stage.config.batch_size).min(batch::MAX_BATCH_SIZE),
            )
        };

        Self {
            stage,
            deleter,
            chunk_size,
        }
    }

    /// Delete `keys` in the given order. Cancellation stops before the next
    /// chunk; whatever was deleted so far is still reported.
    pub async fn delete_originals(&self, keys: &[String]) -> DeleteResult {
        let mut result = DeleteResult::default();

        debug!(
            keys = keys.len(),
            chunk_size = self.chunk_size,
            "deletion of originals has started."
        );

        for chunk in keys.chunks(self.chunk_size) {
            if self.stage.is_cancelled() {
                info!(
                    deleted = result.deleted.len(),
                    remaining = keys.len() - result.deleted.len() - result.failed.len(),
                    "deletion cancelled."
                );
                break;
            }

            let chunk_result = match self.deleter.delete(chunk).await {
                Ok(chunk_result) => chunk_result,
                Err(e) => {
                    warn!(
                        keys = chunk.len(),
                        error = format!("{e:#}"),
                        "delete request failed. the chunk is kept."
                    );
                    DeleteResult {
                        deleted: vec![],
                        failed: chunk
                            .iter()
                            .map(|key| FailedKey::from_error(key, &e))
                            .collect(),
                    }
                }
            };

            for key in &chunk_result.deleted {
                self.stage
                    .send_stats(ArchiveStatistics::DeleteComplete { key: key.clone() })
                    .await;
            }
            for failed in &chunk_result.failed {
                self.stage
                    .send_stats(ArchiveStatistics::DeleteError {
                        key: failed.key.clone(),
                    })
                    .await;
            }

            result.merge(chunk_result);
        }

        if !result.failed.is_empty() {
            self.stage.set_warning();
        }

        info!(
            deleted = result.deleted.len(),
            failed = result.failed.len(),
            "deletion of originals has been completed."
        );

        result
    }
}
