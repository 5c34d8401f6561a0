pub mod args;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::types::{
    ArchiveAge, ClientConfigLocation, S3Credentials, SelectionCriteria, StoragePath,
};

/// Main configuration for an archive run.
///
/// Holds everything an [`ArchivePipeline`](crate::ArchivePipeline) needs:
/// source bucket and prefix, target bucket, age window, delete flag, the
/// candidate cap, AWS client settings and the concurrency knobs.
///
/// # Quick Start
///
/// ```
/// use s3archive_rs::Config;
///
/// let config = Config::for_source("my-bucket", "logs/");
/// assert_eq!(config.max_files, 1000);
/// assert!(config.force); // no interactive prompts
/// assert_eq!(config.target_bucket(), "my-bucket");
/// ```
///
/// Then customize fields as needed:
///
/// ```
/// use s3archive_rs::Config;
/// use s3archive_rs::types::ArchiveAge;
///
/// let mut config = Config::for_source("my-bucket", "");
/// config.target_bucket = Some("archive-bucket".to_string());
/// config.archive_age = ArchiveAge::Minutes(90);
/// config.delete_original = true;
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub source: StoragePath,
    pub target_bucket: Option<String>,
    pub archive_age: ArchiveAge,
    pub delete_original: bool,
    pub max_files: usize,
    pub show_no_progress: bool,
    pub client_config: Option<ClientConfig>,
    pub force_retry_config: ForceRetryConfig,
    pub tracing_config: Option<TracingConfig>,
    pub worker_size: u16,
    pub batch_size: u16,
    pub max_keys: i32,
    pub rate_limit_objects: Option<u32>,
    pub spool_to_disk: bool,
    pub warn_as_error: bool,
    pub force: bool,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

impl Config {
    /// Create a `Config` with library defaults for the given source bucket and
    /// prefix. `force` is set, so deletion (when enabled) never prompts.
    pub fn for_source(bucket: &str, prefix: &str) -> Self {
        Config {
            source: StoragePath::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            },
            client_config: Some(ClientConfig::default()),
            force: true,
            ..Config::default()
        }
    }

    pub fn source_bucket(&self) -> &str {
        self.source.bucket()
    }

    /// The target bucket, which defaults to the source bucket.
    pub fn target_bucket(&self) -> &str {
        match self.target_bucket.as_deref() {
            Some(bucket) if !bucket.is_empty() => bucket,
            _ => self.source.bucket(),
        }
    }

    pub fn source_prefix(&self) -> Option<&str> {
        let prefix = self.source.prefix();
        if prefix.is_empty() { None } else { Some(prefix) }
    }

    /// Build the selection criteria from a single "now" snapshot.
    pub fn selection_criteria(&self, now: DateTime<Utc>) -> Result<SelectionCriteria> {
        SelectionCriteria::new(
            self.archive_age.cutoff_from(now)?,
            self.source_prefix().map(str::to_string),
            self.max_files,
        )
    }
}

impl Default for Config {
    /// The `source` defaults to an empty bucket. Set it before running a
    /// pipeline.
    fn default() -> Self {
        Config {
            source: StoragePath::S3 {
                bucket: String::new(),
                prefix: String::new(),
            },
            target_bucket: None,
            archive_age: ArchiveAge::Hours(crate::types::DEFAULT_ARCHIVE_AGE_HOURS),
            delete_original: false,
            max_files: 1000,
            show_no_progress: false,
            client_config: None,
            force_retry_config: ForceRetryConfig::default(),
            tracing_config: None,
            worker_size: 8,
            batch_size: 1000,
            max_keys: 1000,
            rate_limit_objects: None,
            spool_to_disk: false,
            warn_as_error: false,
            force: false,
            auto_complete_shell: None,
        }
    }
}

/// AWS S3 client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_config_location: ClientConfigLocation,
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
}

impl Default for ClientConfig {
    /// Standard AWS credential and region resolution from the environment.
    fn default() -> Self {
        ClientConfig {
            client_config_location: ClientConfigLocation {
                aws_config_file: None,
                aws_shared_credentials_file: None,
            },
            credential: S3Credentials::FromEnvironment,
            region: None,
            endpoint_url: None,
            force_path_style: false,
            retry_config: RetryConfig {
                aws_max_attempts: 10,
                initial_backoff_milliseconds: 100,
            },
            cli_timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: None,
                operation_attempt_timeout_milliseconds: None,
                connect_timeout_milliseconds: None,
                read_timeout_milliseconds: None,
            },
            disable_stalled_stream_protection: false,
        }
    }
}

/// Retry configuration for AWS SDK operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

/// Timeout configuration for AWS SDK operations.
#[derive(Debug, Clone)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}

/// Application-level retry configuration, applied on top of the AWS SDK
/// retries to throttled and transient failures.
#[derive(Debug, Clone, Copy)]
pub struct ForceRetryConfig {
    pub force_retry_count: u32,
    pub force_retry_interval_milliseconds: u64,
    pub max_backoff_milliseconds: u64,
    pub operation_deadline_milliseconds: u64,
}

impl Default for ForceRetryConfig {
    fn default() -> Self {
        ForceRetryConfig {
            force_retry_count: 5,
            force_retry_interval_milliseconds: 1000,
            max_backoff_milliseconds: 30_000,
            operation_deadline_milliseconds: 300_000,
        }
    }
}
