//! Shared test infrastructure for s3archive-rs.
//!
//! [`MemoryBucket`] is an in-memory [`StorageTrait`] used by the integration
//! tests. [`TestHelper`] drives real AWS S3 for the `e2e_test` suites and uses
//! the `s3archive-e2e-test` AWS profile.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use s3archive_rs::config::args::build_config_from_args;
use s3archive_rs::storage::{
    BatchDeleteOutcome, ListingPage, StorageTrait, UploadAck, UploadBody,
};
use s3archive_rs::types::ListedObject;
use s3archive_rs::types::error::StorageError;
use s3archive_rs::{
    ArchivePipeline, ArchiveReport, Config, PipelineState, create_pipeline_cancellation_token,
};
use uuid::Uuid;
use zip::ZipArchive;

// ---------------------------------------------------------------------------
// In-memory bucket
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BucketState {
    objects: BTreeMap<String, (Bytes, DateTime<Utc>)>,
    uploads: Vec<(String, Bytes, String)>,
    deleted: Vec<String>,
    unreadable: Vec<String>,
    reject_uploads: bool,
}

/// An in-memory bucket. Clones share state.
#[derive(Clone)]
pub struct MemoryBucket {
    name: String,
    state: Arc<Mutex<BucketState>>,
}

impl MemoryBucket {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(BucketState::default())),
        }
    }

    /// Store `content` under `key`, last modified `age` ago.
    pub fn put_aged(&self, key: &str, content: &[u8], age: Duration) {
        self.state.lock().unwrap().objects.insert(
            key.to_string(),
            (Bytes::copy_from_slice(content), Utc::now() - age),
        );
    }

    /// Every GetObject for `key` fails with a permanent error.
    pub fn make_unreadable(&self, key: &str) {
        self.state.lock().unwrap().unreadable.push(key.to_string());
    }

    pub fn reject_uploads(&self) {
        self.state.lock().unwrap().reject_uploads = true;
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn uploads(&self) -> Vec<(String, Bytes, String)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl StorageTrait for MemoryBucket {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn head_bucket(&self) -> Result<()> {
        Ok(())
    }

    async fn list_objects(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ListingPage> {
        let state = self.state.lock().unwrap();
        let mut objects: Vec<ListedObject> = state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix.unwrap_or_default()))
            .filter(|(key, _)| {
                continuation_token
                    .as_ref()
                    .is_none_or(|token| key.as_str() > token.as_str())
            })
            .map(|(key, (content, last_modified))| ListedObject {
                key: key.clone(),
                size: content.len() as i64,
                last_modified: *last_modified,
                e_tag: None,
            })
            .collect();

        let mut next_continuation_token = None;
        if objects.len() > max_keys as usize {
            objects.truncate(max_keys as usize);
            next_continuation_token = objects.last().map(|object| object.key.clone());
        }

        Ok(ListingPage {
            objects,
            next_continuation_token,
        })
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let state = self.state.lock().unwrap();
        if state.unreadable.iter().any(|unreadable| unreadable == key) {
            return Err(anyhow!(StorageError::Permanent(format!("{key} is unreadable"))));
        }
        state
            .objects
            .get(key)
            .map(|(content, _)| content.clone())
            .ok_or_else(|| anyhow!(StorageError::NotFound(key.to_string())))
    }

    async fn put_object(
        &self,
        key: &str,
        body: UploadBody,
        content_type: &str,
    ) -> Result<UploadAck> {
        let content = match body {
            UploadBody::Bytes(bytes) => bytes,
            UploadBody::File(path) => Bytes::from(std::fs::read(path)?),
        };

        let mut state = self.state.lock().unwrap();
        if state.reject_uploads {
            return Err(anyhow!(StorageError::Permanent("upload rejected".to_string())));
        }
        state
            .uploads
            .push((key.to_string(), content.clone(), content_type.to_string()));
        state
            .objects
            .insert(key.to_string(), (content, Utc::now()));

        Ok(UploadAck::default())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.objects.remove(key);
        state.deleted.push(key.to_string());
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<BatchDeleteOutcome> {
        let mut state = self.state.lock().unwrap();
        for key in keys {
            state.objects.remove(key);
            state.deleted.push(key.clone());
        }
        Ok(BatchDeleteOutcome {
            deleted: keys.to_vec(),
            errors: vec![],
        })
    }
}

/// Outcome of one pipeline run, detached from the pipeline.
#[derive(Debug)]
pub struct PipelineResult {
    pub report: Option<ArchiveReport>,
    pub state: PipelineState,
    pub failed_stage: Option<PipelineState>,
    pub has_error: bool,
    pub has_warning: bool,
    pub errors: Vec<String>,
}

fn collect(pipeline: &ArchivePipeline) -> PipelineResult {
    PipelineResult {
        report: pipeline.get_report().cloned(),
        state: pipeline.state(),
        failed_stage: pipeline.failed_stage(),
        has_error: pipeline.has_error(),
        has_warning: pipeline.has_warning(),
        errors: pipeline
            .get_errors_and_consume()
            .unwrap_or_default()
            .into_iter()
            .map(|e| format!("{e:#}"))
            .collect(),
    }
}

/// Run the pipeline over in-memory buckets.
pub async fn run_in_memory(
    config: Config,
    source: &MemoryBucket,
    target: &MemoryBucket,
) -> PipelineResult {
    let mut pipeline = ArchivePipeline::with_storage(
        config,
        Box::new(source.clone()),
        Box::new(target.clone()),
        create_pipeline_cancellation_token(),
    );
    pipeline.close_stats_sender();
    pipeline.run().await;

    collect(&pipeline)
}

/// Entry names and contents of a zip archive, in container order.
pub fn read_archive(archive: &Bytes) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(archive.clone())).unwrap();
    (0..archive.len())
        .map(|index| {
            let mut file = archive.by_index(index).unwrap();
            let mut content = Vec::new();
            std::io::copy(&mut file, &mut content).unwrap();
            (file.name().to_string(), content)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// AWS end-to-end helper
// ---------------------------------------------------------------------------

/// AWS profile used for all E2E tests.
const AWS_PROFILE: &str = "s3archive-e2e-test";

const DEFAULT_REGION: &str = "us-east-1";

/// Deletes every object and the bucket itself when dropped, even if the test
/// panicked.
pub struct BucketGuard {
    helper: Arc<TestHelper>,
    bucket: String,
}

impl Drop for BucketGuard {
    fn drop(&mut self) {
        let helper = self.helper.clone();
        let bucket = self.bucket.clone();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tokio::runtime::Handle::current().block_on(async move {
                helper.delete_bucket_cascade(&bucket).await;
            });
        }));
    }
}

pub struct TestHelper {
    client: Client,
    region: String,
}

impl TestHelper {
    pub async fn new() -> Arc<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(AWS_PROFILE)
            .load()
            .await;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Arc::new(Self {
            client: Client::new(&sdk_config),
            region,
        })
    }

    pub fn bucket_guard(self: &Arc<Self>, bucket: &str) -> BucketGuard {
        BucketGuard {
            helper: Arc::clone(self),
            bucket: bucket.to_string(),
        }
    }

    pub fn generate_bucket_name(&self) -> String {
        format!("s3archive-e2e-{}", Uuid::new_v4())
    }

    pub async fn create_bucket(&self, bucket: &str) {
        let mut builder = self.client.create_bucket().bucket(bucket);

        // us-east-1 must NOT specify a location constraint
        if self.region != "us-east-1" {
            let config = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build();
            builder = builder.create_bucket_configuration(config);
        }

        builder
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to create bucket {bucket}: {e}"));
    }

    pub async fn delete_bucket_cascade(&self, bucket: &str) {
        for key in self.list_objects(bucket, "").await {
            let _ = self
                .client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await;
        }
        let _ = self.client.delete_bucket().bucket(bucket).send().await;
    }

    pub async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to put {bucket}/{key}: {e}"));
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> (Bytes, Option<String>) {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to get {bucket}/{key}: {e}"));
        let content_type = output.content_type().map(|s| s.to_string());
        let body = output.body.collect().await.unwrap().into_bytes();
        (body, content_type)
    }

    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> Vec<String> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(ref token) = continuation_token {
                req = req.continuation_token(token);
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(_) => return keys,
            };

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|key| key.to_string())),
            );

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        keys
    }

    /// Build a `Config` from CLI-style arguments, prepending the binary name
    /// and the e2e profile.
    pub fn build_config(args: Vec<&str>) -> Config {
        let mut full_args: Vec<String> = vec!["s3archive".to_string()];
        full_args.extend(args.iter().map(|s| s.to_string()));
        if !full_args.iter().any(|a| a.starts_with("--aws-")) {
            full_args.push("--aws-profile".to_string());
            full_args.push(AWS_PROFILE.to_string());
        }

        build_config_from_args(full_args)
            .unwrap_or_else(|e| panic!("Failed to build config from args: {e}"))
    }

    pub async fn run_pipeline(config: Config) -> PipelineResult {
        let mut pipeline = ArchivePipeline::new(config, create_pipeline_cancellation_token())
            .await
            .unwrap_or_else(|e| panic!("Failed to create pipeline: {e:#}"));
        pipeline.close_stats_sender();
        pipeline.run().await;

        collect(&pipeline)
    }
}

/// Default timeout for E2E tests (5 minutes).
pub const E2E_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

#[macro_export]
macro_rules! e2e_timeout {
    ($body:expr) => {
        tokio::time::timeout(common::E2E_TIMEOUT, $body)
            .await
            .expect("E2E test timed out")
    };
}
