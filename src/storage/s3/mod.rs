pub mod client_builder;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, Object, ObjectIdentifier, ServerSideEncryption};
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use aws_smithy_types_convert::date_time::DateTimeExt;
use bytes::Bytes;
use leaky_bucket::RateLimiter;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::storage::{
    BatchDeleteError, BatchDeleteOutcome, ListingPage, Storage, StorageFactory, StorageTrait,
    UploadAck, UploadBody,
};
use crate::types::ListedObject;
use crate::types::error::{S3ArchiveError, StorageError};

/// Extracts the S3 error code and message from an AWS SDK error.
///
/// For service errors (S3 API responses), returns the S3 error code
/// (e.g. "AccessDenied", "SlowDown") and the error message from the response.
/// For other error types (network, timeout, construction failure), returns
/// "N/A" as the code and the full error description as the message.
fn extract_sdk_error_details<E>(e: &SdkError<E>) -> (String, String)
where
    E: std::error::Error + ProvideErrorMetadata + 'static,
{
    if let Some(service_err) = e.as_service_error() {
        (
            service_err.code().unwrap_or("unknown").to_string(),
            service_err.message().unwrap_or("no message").to_string(),
        )
    } else {
        ("N/A".to_string(), DisplayErrorContext(e).to_string())
    }
}

/// Map an SDK failure onto the storage error classes the retry layer knows.
fn classify_sdk_error<E>(e: &SdkError<E>) -> StorageError
where
    E: std::error::Error + ProvideErrorMetadata + 'static,
{
    let (s3_error_code, s3_error_message) = extract_sdk_error_details(e);
    match e {
        SdkError::ServiceError(context) => StorageError::from_error_code(
            context.err().code(),
            Some(context.raw().status().as_u16()),
            format!("{s3_error_code} ({s3_error_message})"),
        ),
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StorageError::TransientNetwork(s3_error_message)
        }
        _ => StorageError::Permanent(s3_error_message),
    }
}

/// Factory for creating S3 storage instances.
pub struct S3StorageFactory;

#[async_trait]
impl StorageFactory for S3StorageFactory {
    async fn create(
        bucket: String,
        client_config: Option<ClientConfig>,
        rate_limit_objects_per_sec: Option<Arc<RateLimiter>>,
    ) -> Result<Storage> {
        let client_config = client_config.ok_or_else(|| {
            anyhow!(S3ArchiveError::InvalidConfig(
                "no client configuration for S3 storage.".to_string()
            ))
        })?;
        let client = Arc::new(client_config.create_client().await);

        Ok(Box::new(S3Storage {
            bucket,
            client,
            rate_limit_objects_per_sec,
        }))
    }
}

#[derive(Clone)]
struct S3Storage {
    bucket: String,
    client: Arc<Client>,
    rate_limit_objects_per_sec: Option<Arc<RateLimiter>>,
}

#[async_trait]
impl StorageTrait for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_bucket(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 HeadBucket API call failed for bucket '{}': {} ({}).",
                    self.bucket,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(classify_sdk_error(&e)).context("aws_sdk_s3::client::head_bucket() failed.")
            })?;

        Ok(())
    }

    async fn list_objects(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ListingPage> {
        self.exec_rate_limit_objects_per_sec().await;

        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(prefix.map(str::to_string))
            .set_continuation_token(continuation_token)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    prefix = prefix,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 ListObjectsV2 API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    prefix.unwrap_or_default(),
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(classify_sdk_error(&e))
                    .context("aws_sdk_s3::client::list_objects_v2() failed.")
            })?;

        let objects = output
            .contents()
            .iter()
            .filter_map(to_listed_object)
            .collect();

        let next_continuation_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListingPage {
            objects,
            next_continuation_token,
        })
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        self.exec_rate_limit_objects_per_sec().await;

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 GetObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(classify_sdk_error(&e)).context("aws_sdk_s3::client::get_object() failed.")
            })?;

        let body = output.body.collect().await.map_err(|e| {
            anyhow!(StorageError::TransientNetwork(format!(
                "reading body of s3://{}/{key} failed: {}",
                self.bucket,
                DisplayErrorContext(&e)
            )))
        })?;

        Ok(body.into_bytes())
    }

    async fn put_object(
        &self,
        key: &str,
        body: UploadBody,
        content_type: &str,
    ) -> Result<UploadAck> {
        self.exec_rate_limit_objects_per_sec().await;

        let stream = match body {
            UploadBody::Bytes(bytes) => ByteStream::from(bytes),
            UploadBody::File(path) => ByteStream::from_path(&path).await.map_err(|e| {
                anyhow!(StorageError::Permanent(format!(
                    "spool file {} could not be read: {e}",
                    path.display()
                )))
            })?,
        };

        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(stream)
            .content_type(content_type)
            .server_side_encryption(ServerSideEncryption::Aes256)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 PutObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(classify_sdk_error(&e)).context("aws_sdk_s3::client::put_object() failed.")
            })?;

        Ok(UploadAck {
            e_tag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
        })
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.exec_rate_limit_objects_per_sec().await;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 DeleteObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(classify_sdk_error(&e)).context("aws_sdk_s3::client::delete_object() failed.")
            })?;

        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<BatchDeleteOutcome> {
        self.exec_rate_limit_objects_per_sec_n(keys.len()).await;

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to build ObjectIdentifier")?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .context("Failed to build Delete request")?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    object_count = keys.len(),
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 DeleteObjects API call failed for {} objects in s3://{}: {} ({}).",
                    keys.len(),
                    self.bucket,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(classify_sdk_error(&e))
                    .context("aws_sdk_s3::client::delete_objects() failed.")
            })?;

        Ok(BatchDeleteOutcome {
            deleted: output
                .deleted()
                .iter()
                .filter_map(|deleted| deleted.key().map(str::to_string))
                .collect(),
            errors: output
                .errors()
                .iter()
                .map(|error| BatchDeleteError {
                    key: error.key().unwrap_or_default().to_string(),
                    code: error.code().unwrap_or("unknown").to_string(),
                    message: error.message().unwrap_or("no message").to_string(),
                })
                .collect(),
        })
    }
}

impl S3Storage {
    async fn exec_rate_limit_objects_per_sec(&self) {
        if let Some(ref rate_limiter) = self.rate_limit_objects_per_sec {
            rate_limiter.acquire_one().await;
        }
    }

    /// Acquire one token per key of a batch request.
    async fn exec_rate_limit_objects_per_sec_n(&self, count: usize) {
        if count == 0 {
            return;
        }
        if let Some(ref rate_limiter) = self.rate_limit_objects_per_sec {
            rate_limiter.acquire(count).await;
        }
    }
}

/// Entries without a key or a modification time cannot be judged and are
/// skipped.
fn to_listed_object(object: &Object) -> Option<ListedObject> {
    let key = object.key()?;
    let last_modified = match object.last_modified().map(DateTimeExt::to_chrono_utc) {
        Some(Ok(last_modified)) => last_modified,
        _ => {
            tracing::warn!(key = key, "listed object has no usable last_modified. skipping.");
            return None;
        }
    };

    Some(ListedObject {
        key: key.to_string(),
        size: object.size().unwrap_or_default(),
        last_modified,
        e_tag: object.e_tag().map(str::to_string),
    })
}
