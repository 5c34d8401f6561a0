//! Shared test utilities for the s3archive library crate.
//!
//! [`MockStorage`] is an in-memory bucket implementing [`StorageTrait`] with
//! per-key fault injection. Clones share state, so a test can keep one handle
//! for assertions while the pipeline owns another.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};

use crate::storage::{
    BatchDeleteError, BatchDeleteOutcome, ListingPage, StorageTrait, UploadAck, UploadBody,
};
use crate::types::ListedObject;
use crate::types::error::StorageError;

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

pub(crate) fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

#[derive(Clone)]
struct MockObject {
    content: Bytes,
    listed_size: i64,
    last_modified: DateTime<Utc>,
}

#[derive(Default)]
struct MockState {
    objects: BTreeMap<String, MockObject>,
    uploads: Vec<(String, Bytes, String)>,
    deleted: Vec<String>,
    get_failures: HashMap<String, (StorageError, u32)>,
    get_calls: HashMap<String, u32>,
    delete_failures: HashSet<String>,
    batch_delete_codes: HashMap<String, String>,
    delete_objects_failure: Option<StorageError>,
    list_failure: Option<StorageError>,
    put_failure: Option<StorageError>,
    head_failure: Option<StorageError>,
    head_calls: u32,
    list_calls: u32,
    delete_objects_calls: u32,
    delete_object_calls: u32,
}

#[derive(Clone)]
pub(crate) struct MockStorage {
    bucket: String,
    state: Arc<Mutex<MockState>>,
}

impl MockStorage {
    pub(crate) fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn insert(&self, key: &str, content: &[u8], last_modified_secs: i64) {
        self.state().objects.insert(
            key.to_string(),
            MockObject {
                content: Bytes::copy_from_slice(content),
                listed_size: content.len() as i64,
                last_modified: timestamp(last_modified_secs),
            },
        );
    }

    /// Insert an object whose listed size differs from its content, e.g. a
    /// directory marker or an object that changed after listing.
    pub(crate) fn insert_with_listed_size(
        &self,
        key: &str,
        content: &[u8],
        listed_size: i64,
        last_modified_secs: i64,
    ) {
        self.state().objects.insert(
            key.to_string(),
            MockObject {
                content: Bytes::copy_from_slice(content),
                listed_size,
                last_modified: timestamp(last_modified_secs),
            },
        );
    }

    pub(crate) fn fail_get(&self, key: &str, error: StorageError) {
        self.fail_get_times(key, error, u32::MAX);
    }

    pub(crate) fn fail_get_times(&self, key: &str, error: StorageError, times: u32) {
        self.state()
            .get_failures
            .insert(key.to_string(), (error, times));
    }

    pub(crate) fn fail_delete(&self, key: &str) {
        self.state().delete_failures.insert(key.to_string());
    }

    /// Report `key` as a DeleteObjects per-key error with `code`. A single
    /// DeleteObject for the key still succeeds.
    pub(crate) fn fail_batch_delete_with_code(&self, key: &str, code: &str) {
        self.state()
            .batch_delete_codes
            .insert(key.to_string(), code.to_string());
    }

    pub(crate) fn fail_delete_objects(&self, error: StorageError) {
        self.state().delete_objects_failure = Some(error);
    }

    pub(crate) fn fail_list(&self, error: StorageError) {
        self.state().list_failure = Some(error);
    }

    pub(crate) fn fail_put(&self, error: StorageError) {
        self.state().put_failure = Some(error);
    }

    pub(crate) fn fail_head(&self, error: StorageError) {
        self.state().head_failure = Some(error);
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.state().objects.contains_key(key)
    }

    pub(crate) fn uploads(&self) -> Vec<(String, Bytes, String)> {
        self.state().uploads.clone()
    }

    pub(crate) fn deleted_keys(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    pub(crate) fn get_calls(&self, key: &str) -> u32 {
        self.state().get_calls.get(key).copied().unwrap_or_default()
    }

    pub(crate) fn head_calls(&self) -> u32 {
        self.state().head_calls
    }

    pub(crate) fn list_calls(&self) -> u32 {
        self.state().list_calls
    }

    pub(crate) fn delete_objects_calls(&self) -> u32 {
        self.state().delete_objects_calls
    }

    pub(crate) fn delete_object_calls(&self) -> u32 {
        self.state().delete_object_calls
    }
}

#[async_trait]
impl StorageTrait for MockStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_bucket(&self) -> Result<()> {
        let mut state = self.state();
        state.head_calls += 1;
        match state.head_failure.clone() {
            Some(error) => Err(anyhow!(error)),
            None => Ok(()),
        }
    }

    async fn list_objects(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ListingPage> {
        let mut state = self.state();
        state.list_calls += 1;
        if let Some(error) = state.list_failure.clone() {
            return Err(anyhow!(error));
        }

        let mut objects = state
            .objects
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|prefix| key.starts_with(prefix)))
            .filter(|(key, _)| {
                continuation_token
                    .as_deref()
                    .is_none_or(|token| key.as_str() > token)
            })
            .map(|(key, object)| ListedObject {
                key: key.clone(),
                size: object.listed_size,
                last_modified: object.last_modified,
                e_tag: None,
            })
            .take(max_keys as usize + 1)
            .collect::<Vec<_>>();

        let next_continuation_token = if objects.len() > max_keys as usize {
            objects.truncate(max_keys as usize);
            objects.last().map(|object| object.key.clone())
        } else {
            None
        };

        Ok(ListingPage {
            objects,
            next_continuation_token,
        })
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let mut state = self.state();
        *state.get_calls.entry(key.to_string()).or_default() += 1;

        if let Some((error, remaining)) = state.get_failures.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow!(error.clone()));
            }
        }

        state
            .objects
            .get(key)
            .map(|object| object.content.clone())
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

        let mut state = self.state();
        if let Some(error) = state.put_failure.clone() {
            return Err(anyhow!(error));
        }

        state
            .uploads
            .push((key.to_string(), content.clone(), content_type.to_string()));
        state.objects.insert(
            key.to_string(),
            MockObject {
                listed_size: content.len() as i64,
                content,
                last_modified: Utc::now(),
            },
        );

        Ok(UploadAck {
            e_tag: Some("\"mock-etag\"".to_string()),
            version_id: None,
        })
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut state = self.state();
        state.delete_object_calls += 1;
        if state.delete_failures.contains(key) {
            return Err(anyhow!(StorageError::AccessDenied(key.to_string())));
        }

        state.objects.remove(key);
        state.deleted.push(key.to_string());
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<BatchDeleteOutcome> {
        let mut state = self.state();
        state.delete_objects_calls += 1;
        if let Some(error) = state.delete_objects_failure.clone() {
            return Err(anyhow!(error));
        }

        let mut outcome = BatchDeleteOutcome::default();
        for key in keys {
            if let Some(code) = state.batch_delete_codes.get(key) {
                outcome.errors.push(BatchDeleteError {
                    key: key.clone(),
                    code: code.clone(),
                    message: "batch delete failed".to_string(),
                });
            } else if state.delete_failures.contains(key) {
                outcome.errors.push(BatchDeleteError {
                    key: key.clone(),
                    code: "AccessDenied".to_string(),
                    message: "Access Denied".to_string(),
                });
            } else {
                state.objects.remove(key);
                state.deleted.push(key.clone());
                outcome.deleted.push(key.clone());
            }
        }

        Ok(outcome)
    }
}

/// Prompt handler that answers with a fixed response and records every
/// prompt it was shown.
pub(crate) struct ScriptedPromptHandler {
    response: String,
    interactive: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPromptHandler {
    pub(crate) fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            interactive: true,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn non_interactive() -> Self {
        Self {
            interactive: false,
            ..Self::new("")
        }
    }

    pub(crate) fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        self.prompts.clone()
    }
}

impl crate::safety::PromptHandler for ScriptedPromptHandler {
    fn read_confirmation(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.response.clone())
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}
