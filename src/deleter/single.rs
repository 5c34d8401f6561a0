//! Single-object deletion using the S3 DeleteObject API.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::storage::Storage;

use super::{DeleteResult, Deleter, FailedKey};

/// Deletes objects one at a time using the S3 DeleteObject API.
pub struct SingleDeleter {
    source: Storage,
}

impl SingleDeleter {
    pub fn new(source: Storage) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Deleter for SingleDeleter {
    async fn delete(&self, keys: &[String]) -> Result<DeleteResult> {
        let mut result = DeleteResult::default();

        for key in keys {
            debug!(key = key, "sending DeleteObject request.");

            match self.source.delete_object(key).await {
                Ok(()) => {
                    debug!(key = key, "DeleteObject succeeded.");
                    result.deleted.push(key.clone());
                }
                Err(e) => {
                    warn!(
                        key = key,
                        error = format!("{e:#}"),
                        "S3 DeleteObject API call failed for key '{}'.",
                        key,
                    );
                    result.failed.push(FailedKey::from_error(key, &e));
                }
            }
        }

        Ok(result)
    }
}
