use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use dyn_clone::DynClone;
use leaky_bucket::RateLimiter;

use crate::config::{ClientConfig, Config};
use crate::types::ListedObject;

pub mod retry;
pub mod s3;

/// Type alias for a boxed Storage trait object.
pub type Storage = Box<dyn StorageTrait + Send + Sync>;

/// Factory trait for creating Storage instances.
#[async_trait]
pub trait StorageFactory {
    async fn create(
        bucket: String,
        client_config: Option<ClientConfig>,
        rate_limit_objects_per_sec: Option<Arc<RateLimiter>>,
    ) -> Result<Storage>;
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub objects: Vec<ListedObject>,
    pub next_continuation_token: Option<String>,
}

/// Upload payload that can be replayed on every retry attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadBody {
    Bytes(Bytes),
    File(PathBuf),
}

/// Acknowledgement returned by a successful upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadAck {
    pub e_tag: Option<String>,
    pub version_id: Option<String>,
}

/// A key the store refused to delete in a batch request.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchDeleteError {
    pub key: String,
    pub code: String,
    pub message: String,
}

/// Per-key result of a batch delete request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchDeleteOutcome {
    pub deleted: Vec<String>,
    pub errors: Vec<BatchDeleteError>,
}

/// Object store operations the archive pipeline needs.
///
/// Failures are returned as `anyhow::Error` carrying a
/// [`StorageError`](crate::types::error::StorageError) so that callers and the
/// retry layer can classify them with `downcast_ref`.
#[async_trait]
pub trait StorageTrait: DynClone {
    fn bucket(&self) -> &str;

    /// Verify the bucket exists and the credentials may use it.
    async fn head_bucket(&self) -> Result<()>;

    /// Fetch one page of the listing under `prefix`.
    async fn list_objects(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ListingPage>;

    /// Fetch the whole content of an object.
    async fn get_object(&self, key: &str) -> Result<Bytes>;

    /// Upload an object with server-side encryption enabled.
    async fn put_object(&self, key: &str, body: UploadBody, content_type: &str)
    -> Result<UploadAck>;

    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Delete up to 1000 keys in one request. Per-key refusals are reported in
    /// the outcome, not as an error.
    async fn delete_objects(&self, keys: &[String]) -> Result<BatchDeleteOutcome>;
}

dyn_clone::clone_trait_object!(StorageTrait);

// Default refill interval 100ms
const REFILL_PER_INTERVAL_DIVIDER: usize = 10;

pub fn build_rate_limiter(rate_limit_objects: Option<u32>) -> Option<Arc<RateLimiter>> {
    rate_limit_objects.map(|rate_limit_value| {
        let refill = if (rate_limit_value as usize) <= REFILL_PER_INTERVAL_DIVIDER {
            1
        } else {
            rate_limit_value as usize / REFILL_PER_INTERVAL_DIVIDER
        };
        Arc::new(
            RateLimiter::builder()
                .max(rate_limit_value as usize)
                .initial(rate_limit_value as usize)
                .refill(refill)
                .fair(true)
                .build(),
        )
    })
}

/// Create the S3 storage for one bucket.
///
/// The source and the target share one rate limiter so that the configured
/// budget applies to the run as a whole.
pub async fn create_storage(
    config: &Config,
    bucket: &str,
    rate_limit_objects_per_sec: Option<Arc<RateLimiter>>,
) -> Result<Storage> {
    s3::S3StorageFactory::create(
        bucket.to_string(),
        config.client_config.clone(),
        rate_limit_objects_per_sec,
    )
    .await
}
