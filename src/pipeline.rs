//! Archive pipeline orchestrator.
//!
//! Sequences one run: parameter check → access check → scan → build →
//! upload → (confirm) → delete originals. The originals are only ever touched after the target
//! store acknowledged the upload, and only the keys that actually made it
//! into the archive are eligible.
//!
//! ```text
//! Idle → Scanning → NoCandidates ────────────────────────────→ Completed
//!                 → Building → Uploading → DeletingOriginals → Completed
//! (Idle | Scanning | Building | Uploading) → Failed
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::archive::{ArchiveBuilder, ArchiveOutput};
use crate::config::Config;
use crate::deleter::OriginalsDeleter;
use crate::safety::{PromptHandler, SafetyChecker};
use crate::scanner::ObjectScanner;
use crate::stage::Stage;
use crate::storage::retry::{RetryPolicy, RetryingStorage};
use crate::storage::{self, Storage};
use crate::types::error::{
    S3ArchiveError, exit_code_from_error, is_access_denied_error, is_cancelled_error,
};
use crate::types::token::PipelineCancellationToken;
use crate::types::{ArchiveStatistics, CandidateObject};

/// Content type declared on every uploaded archive.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Key prefix under which archives are written in the target bucket.
pub const ARCHIVE_KEY_PREFIX: &str = "compressed";

/// Target key for an archive created at `at`:
/// `compressed/YYYY/MM/DD/compressed_files_YYYYMMDD_HHMMSS.zip`.
pub fn generate_target_key(at: DateTime<Utc>) -> String {
    format!(
        "{ARCHIVE_KEY_PREFIX}/{}/compressed_files_{}.zip",
        at.format("%Y/%m/%d"),
        at.format("%Y%m%d_%H%M%S")
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Scanning,
    NoCandidates,
    Building,
    Uploading,
    DeletingOriginals,
    Completed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Scanning => "scanning",
            PipelineState::NoCandidates => "no candidates",
            PipelineState::Building => "building",
            PipelineState::Uploading => "uploading",
            PipelineState::DeletingOriginals => "deleting originals",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveReport {
    pub source_bucket: String,
    pub target_bucket: String,
    /// `None` when there was nothing to archive.
    pub target_key: Option<String>,
    pub candidate_count: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub failed_keys: Vec<String>,
    /// Sum over archived entries only.
    pub original_bytes: u64,
    pub compressed_bytes: u64,
    pub deleted_count: usize,
    pub delete_failed_count: usize,
    pub deletion_declined: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
}

impl ArchiveReport {
    fn empty(config: &Config, started_at: DateTime<Utc>) -> Self {
        Self {
            source_bucket: config.source_bucket().to_string(),
            target_bucket: config.target_bucket().to_string(),
            target_key: None,
            candidate_count: 0,
            succeeded_count: 0,
            failed_count: 0,
            failed_keys: vec![],
            original_bytes: 0,
            compressed_bytes: 0,
            deleted_count: 0,
            delete_failed_count: 0,
            deletion_declined: false,
            archived_at: None,
            started_at,
            elapsed_seconds: 0.0,
        }
    }

    /// `1 - compressed / original`. Zero when nothing was archived.
    pub fn compression_ratio(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        1.0 - self.compressed_bytes as f64 / self.original_bytes as f64
    }

    pub fn compression_ratio_percent(&self) -> f64 {
        self.compression_ratio() * 100.0
    }

    /// Negative when the container is larger than its content.
    pub fn space_saved(&self) -> i64 {
        self.original_bytes as i64 - self.compressed_bytes as i64
    }

    pub fn target_url(&self) -> Option<String> {
        self.target_key
            .as_ref()
            .map(|key| format!("s3://{}/{key}", self.target_bucket))
    }

    /// The deletion outcome as a warning, if some originals could not be
    /// deleted.
    pub fn partial_deletion(&self) -> Option<S3ArchiveError> {
        if self.delete_failed_count == 0 {
            return None;
        }
        Some(S3ArchiveError::PartialDeletion {
            deleted: self.deleted_count as u64,
            failed: self.delete_failed_count as u64,
        })
    }
}

/// Structured failure of a run: the stage it failed in and why.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("archive run failed while {stage}: {message}")]
pub struct RunFailure {
    pub stage: PipelineState,
    pub message: String,
    pub exit_code: i32,
}

/// The core archive pipeline.
///
/// ## Usage
///
/// ```no_run
/// # async fn example() -> anyhow::Result<()> {
/// use s3archive_rs::{ArchivePipeline, Config, create_pipeline_cancellation_token};
///
/// let mut config = Config::for_source("my-bucket", "logs/");
/// config.delete_original = true;
///
/// let mut pipeline = ArchivePipeline::new(config, create_pipeline_cancellation_token()).await?;
/// pipeline.close_stats_sender();
/// pipeline.run().await;
///
/// if pipeline.has_error() {
///     eprintln!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
/// } else if let Some(report) = pipeline.get_report() {
///     println!("archived {} file(s) to {:?}", report.succeeded_count, report.target_url());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ArchivePipeline {
    config: Config,
    source: Storage,
    target: Storage,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<ArchiveStatistics>,
    stats_receiver: Receiver<ArchiveStatistics>,
    has_error: Arc<AtomicBool>,
    has_warning: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<anyhow::Error>>>,
    state: PipelineState,
    state_history: Vec<PipelineState>,
    failed_stage: Option<PipelineState>,
    report: Option<ArchiveReport>,
    prompt_handler: Option<Box<dyn PromptHandler>>,
    ready: bool,
}

impl ArchivePipeline {
    /// Create a pipeline backed by S3 for both source and target.
    ///
    /// Both storages share one rate limiter.
    pub async fn new(config: Config, cancellation_token: PipelineCancellationToken) -> Result<Self> {
        let rate_limiter = storage::build_rate_limiter(config.rate_limit_objects);
        let source =
            storage::create_storage(&config, config.source_bucket(), rate_limiter.clone()).await?;
        let target = storage::create_storage(&config, config.target_bucket(), rate_limiter).await?;

        Ok(Self::with_storage(config, source, target, cancellation_token))
    }

    /// Create a pipeline over the given storages. Both are wrapped in the
    /// retry layer configured by `config.force_retry_config`.
    pub fn with_storage(
        config: Config,
        source: Storage,
        target: Storage,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        let policy = RetryPolicy::from(&config.force_retry_config);
        let (stats_sender, stats_receiver) = async_channel::unbounded();

        Self {
            source: RetryingStorage::boxed(source, policy),
            target: RetryingStorage::boxed(target, policy),
            config,
            cancellation_token,
            stats_sender,
            stats_receiver,
            has_error: Arc::new(AtomicBool::new(false)),
            has_warning: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(Mutex::new(VecDeque::new())),
            state: PipelineState::Idle,
            state_history: vec![PipelineState::Idle],
            failed_stage: None,
            report: None,
            prompt_handler: None,
            ready: true,
        }
    }

    /// Replace the stdin/stdout confirmation prompt.
    pub fn set_prompt_handler(&mut self, prompt_handler: Box<dyn PromptHandler>) {
        self.prompt_handler = Some(prompt_handler);
    }

    /// Run the pipeline once. The outcome is read back with
    /// [`has_error`](Self::has_error), [`get_report`](Self::get_report) and
    /// [`state`](Self::state).
    pub async fn run(&mut self) {
        if !self.ready {
            self.record_error(anyhow!(S3ArchiveError::Pipeline(
                "ArchivePipeline::run() called more than once".to_string()
            )));
            return;
        }
        self.ready = false;

        let started_at = Utc::now();
        let start_time = tokio::time::Instant::now();

        match self.execute(started_at).await {
            Ok(mut report) => {
                report.elapsed_seconds = start_time.elapsed().as_secs_f64();
                log_summary(&report);
                self.report = Some(report);
                self.transition(PipelineState::Completed);
            }
            Err(e) => {
                if is_cancelled_error(&e) {
                    info!(stage = %self.state, "archive run cancelled.");
                } else {
                    error!(stage = %self.state, error = format!("{e:#}"), "archive run failed.");
                }
                self.failed_stage = Some(self.state);
                self.record_error(e);
                self.transition(PipelineState::Failed);
            }
        }

        if self.config.warn_as_error && self.has_warning() {
            self.record_error(anyhow!(S3ArchiveError::Pipeline(
                "warnings promoted to errors (--warn-as-error)".to_string()
            )));
        }

        self.close_stats_sender();
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    /// True when some fetch or delete failed without failing the run.
    pub fn has_warning(&self) -> bool {
        self.has_warning.load(Ordering::SeqCst)
    }

    /// Consume and return all accumulated errors.
    ///
    /// Returns `None` if no errors occurred.
    pub fn get_errors_and_consume(&self) -> Option<Vec<anyhow::Error>> {
        if !self.has_error() {
            return None;
        }
        let mut error_list = self.errors.lock().ok()?;
        Some(error_list.drain(..).collect())
    }

    /// Get error messages without consuming them.
    pub fn get_error_messages(&self) -> Option<Vec<String>> {
        if !self.has_error() {
            return None;
        }
        let error_list = self.errors.lock().ok()?;
        Some(error_list.iter().map(|e| e.to_string()).collect())
    }

    pub fn get_report(&self) -> Option<&ArchiveReport> {
        self.report.as_ref()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state the run went through, starting with `Idle`.
    pub fn state_history(&self) -> &[PipelineState] {
        &self.state_history
    }

    /// The stage that was active when the run failed.
    pub fn failed_stage(&self) -> Option<PipelineState> {
        self.failed_stage
    }

    /// Progress events for the indicator. The channel is closed when
    /// [`run`](Self::run) returns.
    pub fn get_stats_receiver(&self) -> Receiver<ArchiveStatistics> {
        self.stats_receiver.clone()
    }

    /// Close the stats channel. Call this before `run()` when no progress
    /// reporting is needed.
    pub fn close_stats_sender(&self) {
        self.stats_sender.close();
    }

    // -----------------------------------------------------------------------
    // Internal methods
    // -----------------------------------------------------------------------

    async fn execute(&mut self, started_at: DateTime<Utc>) -> Result<ArchiveReport> {
        // One snapshot of "now" for the whole run. Run parameters are checked
        // here, before any request reaches a bucket.
        let now = Utc::now();
        let criteria = self.config.selection_criteria(now)?;

        self.transition(PipelineState::Scanning);
        self.check_bucket_access().await?;

        info!(
            source_bucket = self.config.source_bucket(),
            target_bucket = self.config.target_bucket(),
            prefix = self.config.source_prefix(),
            older_than = %self.config.archive_age,
            cutoff = criteria.cutoff.to_rfc3339(),
            delete_original = self.config.delete_original,
            max_files = self.config.max_files,
            "archive run configuration."
        );

        let stage = self.create_stage();
        let candidates = ObjectScanner::new(stage.clone()).scan(&criteria).await?;
        log_candidates(&candidates, now);

        let mut report = ArchiveReport::empty(&self.config, started_at);
        report.candidate_count = candidates.len();

        if candidates.is_empty() {
            info!("no objects to archive.");
            self.transition(PipelineState::NoCandidates);
            return Ok(report);
        }

        self.transition(PipelineState::Building);
        let output = ArchiveBuilder::new(stage.clone()).build(&candidates).await?;
        if output.cancelled {
            return Err(anyhow!(S3ArchiveError::Cancelled));
        }

        report.succeeded_count = output.entries.len();
        report.failed_count = output.failed_keys.len();
        report.failed_keys = output.failed_keys.clone();
        report.original_bytes = output.original_bytes;
        report.compressed_bytes = output.compressed_bytes();

        self.transition(PipelineState::Uploading);
        let archived_at = Utc::now();
        let target_key = generate_target_key(archived_at);
        self.upload(&output, &target_key).await?;
        report.archived_at = Some(archived_at);
        report.target_key = Some(target_key);

        if self.config.delete_original {
            self.delete_originals(&stage, &output, &mut report).await?;
        }

        Ok(report)
    }

    async fn check_bucket_access(&self) -> Result<()> {
        for storage in [&self.source, &self.target] {
            if let Err(e) = storage.head_bucket().await {
                let message = format!("s3://{}: {e:#}", storage.bucket());
                if is_access_denied_error(&e) {
                    return Err(anyhow!(S3ArchiveError::Access(message)));
                }
                return Err(anyhow!(S3ArchiveError::StorageUnavailable(message)));
            }
        }
        Ok(())
    }

    async fn upload(&self, output: &ArchiveOutput, target_key: &str) -> Result<()> {
        debug!(
            bucket = self.target.bucket(),
            key = target_key,
            size = output.compressed_bytes(),
            "uploading archive."
        );

        let ack = self
            .target
            .put_object(target_key, output.archive.upload_body(), ARCHIVE_CONTENT_TYPE)
            .await
            .map_err(|e| {
                let message = format!("s3://{}/{target_key}: {e:#}", self.target.bucket());
                if is_access_denied_error(&e) {
                    anyhow!(S3ArchiveError::Access(message))
                } else {
                    anyhow!(S3ArchiveError::Finalization(message))
                }
            })?;

        info!(
            bucket = self.target.bucket(),
            key = target_key,
            e_tag = ack.e_tag,
            version_id = ack.version_id,
            size = output.compressed_bytes(),
            "archive has been uploaded."
        );
        let _ = self
            .stats_sender
            .send(ArchiveStatistics::ArchiveUploaded {
                key: target_key.to_string(),
                bytes: output.compressed_bytes(),
            })
            .await;

        Ok(())
    }

    async fn delete_originals(
        &mut self,
        stage: &Stage,
        output: &ArchiveOutput,
        report: &mut ArchiveReport,
    ) -> Result<()> {
        let keys = output.succeeded_keys();
        if keys.is_empty() {
            info!("no archived originals to delete.");
            return Ok(());
        }

        let checker = match self.prompt_handler.take() {
            Some(prompt_handler) => SafetyChecker::with_prompt_handler(&self.config, prompt_handler),
            None => SafetyChecker::new(&self.config),
        };
        if !checker.confirm_deletion(keys.len(), self.config.source_bucket())? {
            info!(keys = keys.len(), "deletion declined. originals are kept.");
            report.deletion_declined = true;
            return Ok(());
        }

        self.transition(PipelineState::DeletingOriginals);
        let result = OriginalsDeleter::new(stage.clone())
            .delete_originals(&keys)
            .await;
        report.deleted_count = result.deleted.len();
        report.delete_failed_count = result.failed.len();

        if let Some(partial) = report.partial_deletion() {
            warn!(
                deleted = report.deleted_count,
                failed = report.delete_failed_count,
                "{partial}"
            );
        }
        if self.cancellation_token.is_cancelled() {
            warn!(
                deleted = report.deleted_count,
                remaining = keys.len() - report.deleted_count - report.delete_failed_count,
                "deletion was cancelled. the archive is complete."
            );
            self.has_warning.store(true, Ordering::SeqCst);
        }

        Ok(())
    }

    fn create_stage(&self) -> Stage {
        Stage::new(
            self.config.clone(),
            dyn_clone::clone_box(&*self.source),
            dyn_clone::clone_box(&*self.target),
            self.stats_sender.clone(),
            self.cancellation_token.clone(),
            self.has_warning.clone(),
        )
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "pipeline state changed.");
        self.state = next;
        self.state_history.push(next);
    }

    fn record_error(&self, error: anyhow::Error) {
        self.has_error.store(true, Ordering::SeqCst);
        if let Ok(mut errors) = self.errors.lock() {
            errors.push_back(error);
        }
    }
}

fn log_candidates(candidates: &[CandidateObject], now: DateTime<Utc>) {
    for candidate in candidates {
        debug!(
            key = candidate.key(),
            size = candidate.size(),
            age_minutes = (now - candidate.last_modified()).num_minutes(),
            "candidate selected."
        );
    }
}

fn log_summary(report: &ArchiveReport) {
    info!(
        archive = report.target_url(),
        candidates = report.candidate_count,
        archived = report.succeeded_count,
        failed = report.failed_count,
        original_bytes = report.original_bytes,
        compressed_bytes = report.compressed_bytes,
        compression_ratio_percent = format!("{:.1}", report.compression_ratio_percent()),
        deleted = report.deleted_count,
        delete_failed = report.delete_failed_count,
        "archive run has been completed."
    );
}

/// Programmatic entry point: runs the pipeline without any prompt and
/// returns either the report or a structured failure.
pub async fn run_archive(
    mut config: Config,
    cancellation_token: PipelineCancellationToken,
) -> std::result::Result<ArchiveReport, RunFailure> {
    config.force = true;
    config.show_no_progress = true;

    let mut pipeline = ArchivePipeline::new(config, cancellation_token)
        .await
        .map_err(|e| RunFailure {
            stage: PipelineState::Idle,
            message: format!("{e:#}"),
            exit_code: exit_code_from_error(&e),
        })?;

    run_to_result(&mut pipeline).await
}

pub(crate) async fn run_to_result(
    pipeline: &mut ArchivePipeline,
) -> std::result::Result<ArchiveReport, RunFailure> {
    pipeline.close_stats_sender();
    pipeline.run().await;

    if let Some(errors) = pipeline.get_errors_and_consume() {
        let stage = pipeline.failed_stage().unwrap_or(pipeline.state());
        let first = errors.first();
        return Err(RunFailure {
            stage,
            message: first
                .map(|e| format!("{e:#}"))
                .unwrap_or_else(|| "unknown error".to_string()),
            exit_code: first.map(exit_code_from_error).unwrap_or(1),
        });
    }

    pipeline.get_report().cloned().ok_or_else(|| RunFailure {
        stage: pipeline.state(),
        message: "archive run produced no report".to_string(),
        exit_code: 1,
    })
}
