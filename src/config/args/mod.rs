use crate::config::{
    CLITimeoutConfig, ClientConfig, Config, ForceRetryConfig, RetryConfig, TracingConfig,
};
use crate::types::{AccessKeys, ArchiveAge, ClientConfigLocation, S3Credentials, StoragePath};
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::ffi::OsString;
use std::path::PathBuf;

#[cfg(test)]
mod tests;

// ---------------------------------------------------------------------------
// Default constants
// ---------------------------------------------------------------------------

const DEFAULT_MAX_FILES: usize = 1000;
const DEFAULT_DELETE_ORIGINAL: bool = false;
const DEFAULT_WORKER_SIZE: u16 = 8;
const DEFAULT_BATCH_SIZE: u16 = 1000;
const DEFAULT_SPOOL_TO_DISK: bool = false;
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_FORCE_RETRY_COUNT: u32 = 5;
const DEFAULT_FORCE_RETRY_INTERVAL_MILLISECONDS: u64 = 1000;
const DEFAULT_MAX_BACKOFF_MILLISECONDS: u64 = 30_000;
const DEFAULT_OPERATION_DEADLINE_MILLISECONDS: u64 = 300_000;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_WARN_AS_ERROR: bool = false;
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_MAX_KEYS: i32 = 1000;
const DEFAULT_DISABLE_STALLED_STREAM_PROTECTION: bool = false;
const DEFAULT_SHOW_NO_PROGRESS: bool = false;
const DEFAULT_FORCE: bool = false;

// About 100 years in either unit.
const MAX_MINUTES_BACK: u64 = 52_560_000;
const MAX_HOURS_BACK: u64 = 876_000;

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

const ERROR_MESSAGE_INVALID_SOURCE: &str =
    "Source must be an S3 path starting with 's3://' (e.g., s3://bucket/prefix).";
const ERROR_MESSAGE_INVALID_TARGET_BUCKET: &str =
    "Target bucket must be a bucket name without '/' (e.g., archive-bucket).";
const ERROR_MESSAGE_MAX_FILES_ZERO: &str = "Max files must be at least 1.";
const ERROR_MESSAGE_MINUTES_BACK_ZERO: &str = "Minutes back must be greater than 0.";
const ERROR_MESSAGE_HOURS_BACK_ZERO: &str = "Hours back must be greater than 0.";
const ERROR_MESSAGE_MINUTES_BACK_TOO_LARGE: &str = "Minutes back must be at most 52560000.";
const ERROR_MESSAGE_HOURS_BACK_TOO_LARGE: &str = "Hours back must be at most 876000.";
const ERROR_MESSAGE_WORKER_SIZE_ZERO: &str = "Worker size must be at least 1.";
const ERROR_MESSAGE_BATCH_SIZE_ZERO: &str = "Batch size must be at least 1.";
const ERROR_MESSAGE_BATCH_SIZE_TOO_LARGE: &str = "Batch size must be at most 1000 (S3 API limit).";
const ERROR_MESSAGE_MAX_KEYS_OUT_OF_RANGE: &str = "Max keys must be between 1 and 1000.";
const ERROR_MESSAGE_OPERATION_DEADLINE_ZERO: &str =
    "Operation deadline must be at least 1 millisecond.";

// ---------------------------------------------------------------------------
// Value parser helpers
// ---------------------------------------------------------------------------

fn check_s3_source(s: &str) -> Result<String, String> {
    if s.starts_with("s3://") && s.len() > 5 {
        Ok(s.to_string())
    } else {
        Err(ERROR_MESSAGE_INVALID_SOURCE.to_string())
    }
}

fn check_bucket_name(s: &str) -> Result<String, String> {
    if s.is_empty() || s.contains('/') {
        Err(ERROR_MESSAGE_INVALID_TARGET_BUCKET.to_string())
    } else {
        Ok(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// CLIArgs (clap-derived argument struct)
// ---------------------------------------------------------------------------

/// s3archive - Archive aged Amazon S3 objects into a single zip.
///
/// Selects objects older than a cutoff, packs them into one deflate-compressed
/// zip, uploads it under compressed/YYYY/MM/DD/ and optionally deletes the
/// archived originals.
///
/// Example:
///   s3archive s3://my-bucket/logs/ --hours-back 48
///   s3archive s3://my-bucket/ --minutes-back 30 --target-bucket archive-bucket
///   s3archive s3://my-bucket/tmp/ --delete-original --max-files 500 -v
#[derive(Parser, Clone, Debug)]
#[command(name = "s3archive", version, about, long_about = None)]
pub struct CLIArgs {
    /// S3 source path: s3://<BUCKET_NAME>[/prefix]
    #[arg(
        env,
        help = "s3://<BUCKET_NAME>[/prefix]",
        value_parser = check_s3_source,
        default_value_if("auto_complete_shell", clap::builder::ArgPredicate::IsPresent, "s3://ignored"),
        required = false,
    )]
    pub source: String,

    // -----------------------------------------------------------------------
    // Archive options
    // -----------------------------------------------------------------------
    /// Bucket receiving the archive. Defaults to the source bucket.
    #[arg(long, env, value_parser = check_bucket_name, help_heading = "Archive")]
    pub target_bucket: Option<String>,

    /// Archive objects older than this many minutes (at most 52560000). Takes precedence over --hours-back.
    #[arg(long, env, help_heading = "Archive")]
    pub minutes_back: Option<u64>,

    /// Archive objects older than this many hours (at most 876000). Default: 24.
    #[arg(long, env, help_heading = "Archive")]
    pub hours_back: Option<u64>,

    /// Delete the originals that were archived, after a successful upload.
    #[arg(long, env, default_value_t = DEFAULT_DELETE_ORIGINAL, help_heading = "Archive")]
    pub delete_original: bool,

    /// Maximum number of objects per archive. Default: 1000.
    #[arg(long, env, default_value_t = DEFAULT_MAX_FILES, help_heading = "Archive")]
    pub max_files: usize,

    /// Write the archive to a temporary file instead of memory.
    #[arg(long, env, default_value_t = DEFAULT_SPOOL_TO_DISK, help_heading = "Archive")]
    pub spool_to_disk: bool,

    // -----------------------------------------------------------------------
    // General options
    // -----------------------------------------------------------------------
    /// Don't show the progress bar.
    #[arg(long, env, default_value_t = DEFAULT_SHOW_NO_PROGRESS, help_heading = "General")]
    pub show_no_progress: bool,

    /// Skip the confirmation prompt before deleting originals.
    #[arg(short = 'f', long, env, default_value_t = DEFAULT_FORCE, help_heading = "General")]
    pub force: bool,

    // -----------------------------------------------------------------------
    // Performance options
    // -----------------------------------------------------------------------
    /// Number of objects fetched concurrently. Default: 8.
    #[arg(long, env, default_value_t = DEFAULT_WORKER_SIZE, help_heading = "Performance")]
    pub worker_size: u16,

    /// Keys per DeleteObjects request. 1 uses DeleteObject per key. Default: 1000.
    #[arg(long, env, default_value_t = DEFAULT_BATCH_SIZE, help_heading = "Performance")]
    pub batch_size: u16,

    /// Maximum S3 requests per second.
    #[arg(long, env, help_heading = "Performance")]
    pub rate_limit_objects: Option<u32>,

    // -----------------------------------------------------------------------
    // Logging options
    // -----------------------------------------------------------------------
    /// Verbosity level. -q (quiet), default (normal), -v, -vv, -vvv.
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Output logs in JSON format.
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Logging")]
    pub json_tracing: bool,

    /// Enable AWS SDK tracing.
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Logging")]
    pub aws_sdk_tracing: bool,

    /// Enable tracing span events.
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Logging")]
    pub span_events_tracing: bool,

    /// Disable colored output in logs.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Logging")]
    pub disable_color_tracing: bool,

    // -----------------------------------------------------------------------
    // Retry options
    // -----------------------------------------------------------------------
    /// Maximum retry attempts for AWS SDK operations. Default: 10.
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, help_heading = "Retry")]
    pub aws_max_attempts: u32,

    /// Initial backoff in milliseconds for SDK retries. Default: 100.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, help_heading = "Retry")]
    pub initial_backoff_milliseconds: u64,

    /// Application-level retries for throttled or transient failures. Default: 5.
    #[arg(long, env, default_value_t = DEFAULT_FORCE_RETRY_COUNT, help_heading = "Retry")]
    pub force_retry_count: u32,

    /// First backoff in ms between application-level retries, doubled per retry. Default: 1000.
    #[arg(long, env, default_value_t = DEFAULT_FORCE_RETRY_INTERVAL_MILLISECONDS, help_heading = "Retry")]
    pub force_retry_interval_milliseconds: u64,

    /// Upper bound in ms for the application-level backoff. Default: 30000.
    #[arg(long, env, default_value_t = DEFAULT_MAX_BACKOFF_MILLISECONDS, help_heading = "Retry")]
    pub max_backoff_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Timeout options
    // -----------------------------------------------------------------------
    /// Hard deadline in ms for each S3 call attempt, including body transfer. Default: 300000.
    #[arg(long, env, default_value_t = DEFAULT_OPERATION_DEADLINE_MILLISECONDS, help_heading = "Timeout")]
    pub operation_deadline_milliseconds: u64,

    /// SDK overall operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_timeout_milliseconds: Option<u64>,

    /// SDK per-attempt operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_attempt_timeout_milliseconds: Option<u64>,

    /// Connection timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub connect_timeout_milliseconds: Option<u64>,

    /// Read timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub read_timeout_milliseconds: Option<u64>,

    // -----------------------------------------------------------------------
    // AWS configuration
    // -----------------------------------------------------------------------
    /// AWS config file path.
    #[arg(long, env, help_heading = "AWS")]
    pub aws_config_file: Option<PathBuf>,

    /// AWS shared credentials file path.
    #[arg(long, env, help_heading = "AWS")]
    pub aws_shared_credentials_file: Option<PathBuf>,

    /// AWS profile. If not set, uses the default credential chain.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub aws_profile: Option<String>,

    /// AWS access key ID.
    #[arg(
        long,
        env,
        value_parser = NonEmptyStringValueParser::new(),
        conflicts_with = "aws_profile",
        requires = "aws_secret_key",
        help_heading = "AWS"
    )]
    pub aws_access_key: Option<String>,

    /// AWS secret access key.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub aws_secret_key: Option<String>,

    /// AWS session token.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub aws_session_token: Option<String>,

    /// AWS region.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub aws_region: Option<String>,

    /// Custom S3-compatible endpoint URL (e.g. MinIO, Wasabi).
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub aws_endpoint_url: Option<String>,

    /// Force path-style access (required for some S3-compatible services).
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "AWS")]
    pub force_path_style: bool,

    /// Disable stalled stream protection.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_STALLED_STREAM_PROTECTION, help_heading = "AWS")]
    pub disable_stalled_stream_protection: bool,

    // -----------------------------------------------------------------------
    // Advanced options
    // -----------------------------------------------------------------------
    /// Treat warnings as errors (exit code 1 instead of 3).
    #[arg(long, env, default_value_t = DEFAULT_WARN_AS_ERROR, help_heading = "Advanced")]
    pub warn_as_error: bool,

    /// Max keys per listing request. Default: 1000.
    #[arg(long, env, default_value_t = DEFAULT_MAX_KEYS, help_heading = "Advanced")]
    pub max_keys: i32,

    /// Generate shell completions.
    #[arg(long, env, help_heading = "Advanced")]
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

// ---------------------------------------------------------------------------
// parse_from_args (public API)
// ---------------------------------------------------------------------------

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// # Example
///
/// ```
/// use s3archive_rs::config::args::parse_from_args;
///
/// let args = vec!["s3archive", "s3://my-bucket/logs/", "--delete-original"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert!(cli_args.delete_original);
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

// ---------------------------------------------------------------------------
// Validation and Config conversion
// ---------------------------------------------------------------------------

impl CLIArgs {
    fn validate(&self) -> Result<(), String> {
        if self.max_files == 0 {
            return Err(ERROR_MESSAGE_MAX_FILES_ZERO.to_string());
        }
        if self.minutes_back == Some(0) {
            return Err(ERROR_MESSAGE_MINUTES_BACK_ZERO.to_string());
        }
        // Ignored when minutes_back is given, so only checked on its own.
        if self.minutes_back.is_none() && self.hours_back == Some(0) {
            return Err(ERROR_MESSAGE_HOURS_BACK_ZERO.to_string());
        }
        if self.minutes_back.is_some_and(|minutes| minutes > MAX_MINUTES_BACK) {
            return Err(ERROR_MESSAGE_MINUTES_BACK_TOO_LARGE.to_string());
        }
        if self.minutes_back.is_none()
            && self.hours_back.is_some_and(|hours| hours > MAX_HOURS_BACK)
        {
            return Err(ERROR_MESSAGE_HOURS_BACK_TOO_LARGE.to_string());
        }
        if self.worker_size == 0 {
            return Err(ERROR_MESSAGE_WORKER_SIZE_ZERO.to_string());
        }
        if self.batch_size == 0 {
            return Err(ERROR_MESSAGE_BATCH_SIZE_ZERO.to_string());
        }
        if self.batch_size > 1000 {
            return Err(ERROR_MESSAGE_BATCH_SIZE_TOO_LARGE.to_string());
        }
        if !(1..=1000).contains(&self.max_keys) {
            return Err(ERROR_MESSAGE_MAX_KEYS_OUT_OF_RANGE.to_string());
        }
        if self.operation_deadline_milliseconds == 0 {
            return Err(ERROR_MESSAGE_OPERATION_DEADLINE_ZERO.to_string());
        }
        Ok(())
    }

    fn build_client_config(&self) -> ClientConfig {
        let credential = if let Some(ref profile) = self.aws_profile {
            S3Credentials::Profile(profile.clone())
        } else if let Some(ref access_key) = self.aws_access_key {
            S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key: access_key.clone(),
                    secret_access_key: self.aws_secret_key.clone().unwrap_or_default(),
                    session_token: self.aws_session_token.clone(),
                },
            }
        } else {
            S3Credentials::FromEnvironment
        };

        ClientConfig {
            client_config_location: ClientConfigLocation {
                aws_config_file: self.aws_config_file.clone(),
                aws_shared_credentials_file: self.aws_shared_credentials_file.clone(),
            },
            credential,
            region: self.aws_region.clone(),
            endpoint_url: self.aws_endpoint_url.clone(),
            force_path_style: self.force_path_style,
            retry_config: RetryConfig {
                aws_max_attempts: self.aws_max_attempts,
                initial_backoff_milliseconds: self.initial_backoff_milliseconds,
            },
            cli_timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: self.operation_timeout_milliseconds,
                operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
                connect_timeout_milliseconds: self.connect_timeout_milliseconds,
                read_timeout_milliseconds: self.read_timeout_milliseconds,
            },
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
        }
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let log_level = self.verbosity.log_level()?;

        Some(TracingConfig {
            tracing_level: log_level,
            json_tracing: self.json_tracing,
            aws_sdk_tracing: self.aws_sdk_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
        })
    }

    fn parse_source(&self) -> Result<StoragePath, String> {
        let without_scheme = self
            .source
            .strip_prefix("s3://")
            .ok_or_else(|| ERROR_MESSAGE_INVALID_SOURCE.to_string())?;

        let (bucket, prefix) = match without_scheme.split_once('/') {
            Some((bucket, prefix)) => (bucket.to_string(), prefix.to_string()),
            None => (without_scheme.to_string(), String::new()),
        };

        if bucket.is_empty() {
            return Err(ERROR_MESSAGE_INVALID_SOURCE.to_string());
        }

        Ok(StoragePath::S3 { bucket, prefix })
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        args.validate()?;

        let source = args.parse_source()?;
        let client_config = args.build_client_config();
        let tracing_config = args.build_tracing_config();

        Ok(Config {
            source,
            target_bucket: args.target_bucket.clone(),
            archive_age: ArchiveAge::resolve(args.minutes_back, args.hours_back),
            delete_original: args.delete_original,
            max_files: args.max_files,
            show_no_progress: args.show_no_progress,
            client_config: Some(client_config),
            force_retry_config: ForceRetryConfig {
                force_retry_count: args.force_retry_count,
                force_retry_interval_milliseconds: args.force_retry_interval_milliseconds,
                max_backoff_milliseconds: args.max_backoff_milliseconds,
                operation_deadline_milliseconds: args.operation_deadline_milliseconds,
            },
            tracing_config,
            worker_size: args.worker_size,
            batch_size: args.batch_size,
            max_keys: args.max_keys,
            rate_limit_objects: args.rate_limit_objects,
            spool_to_disk: args.spool_to_disk,
            warn_as_error: args.warn_as_error,
            force: args.force,
            auto_complete_shell: args.auto_complete_shell,
        })
    }
}
