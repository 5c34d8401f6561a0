use anyhow::Error;
use thiserror::Error;

/// Application-level error types for s3archive-rs.
///
/// ## Exit Codes
///
/// Each variant maps to an exit code (via `exit_code()`):
/// - 0: Non-error conditions (Cancelled)
/// - 1: General errors (Access, StorageUnavailable, Finalization, Pipeline)
/// - 2: Configuration errors (InvalidConfig)
/// - 3: Partial failure (some originals deleted, some failed)
#[derive(Error, Debug, PartialEq)]
pub enum S3ArchiveError {
    /// Configuration error. Raised before any remote call.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Authentication or authorization failure against a bucket.
    #[error("Access error: {0}")]
    Access(String),

    /// The object store could not be reached or kept failing.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The archive could not be sealed or uploaded.
    #[error("Archive finalization failed: {0}")]
    Finalization(String),

    /// Operation cancelled by user.
    #[error("Operation cancelled by user")]
    Cancelled,

    /// Some originals were deleted, some were not.
    #[error("Partial deletion: {deleted} deleted, {failed} failed")]
    PartialDeletion { deleted: u64, failed: u64 },

    /// General pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl S3ArchiveError {
    pub fn exit_code(&self) -> i32 {
        match self {
            S3ArchiveError::Cancelled => 0,
            S3ArchiveError::InvalidConfig(_) => 2,
            S3ArchiveError::PartialDeletion { .. } => 3,
            _ => 1,
        }
    }
}

/// Classified failure of a single object store operation.
///
/// The retry layer only looks at this type: throttling and transient network
/// failures are retried, everything else is returned to the caller at once.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Throttled(_) | StorageError::TransientNetwork(_)
        )
    }

    /// Classify an S3 error code and HTTP status.
    ///
    /// HEAD requests carry no error body, so the status code decides when the
    /// code is absent.
    pub fn from_error_code(code: Option<&str>, http_status: Option<u16>, message: String) -> Self {
        match code {
            Some("NoSuchKey" | "NoSuchBucket" | "NotFound") => StorageError::NotFound(message),
            Some(
                "AccessDenied"
                | "AllAccessDisabled"
                | "InvalidAccessKeyId"
                | "SignatureDoesNotMatch"
                | "ExpiredToken"
                | "InvalidToken"
                | "AccountProblem",
            ) => StorageError::AccessDenied(message),
            Some(
                "SlowDown"
                | "Throttling"
                | "ThrottlingException"
                | "RequestLimitExceeded"
                | "TooManyRequests"
                | "RequestThrottled",
            ) => StorageError::Throttled(message),
            Some("InternalError" | "ServiceUnavailable" | "RequestTimeout") => {
                StorageError::TransientNetwork(message)
            }
            _ => match http_status {
                Some(404) => StorageError::NotFound(message),
                Some(401 | 403) => StorageError::AccessDenied(message),
                Some(429) => StorageError::Throttled(message),
                Some(500 | 502 | 503 | 504) => StorageError::TransientNetwork(message),
                _ => StorageError::Permanent(message),
            },
        }
    }
}

/// Find the classified storage failure inside an anyhow chain, if any.
pub fn storage_error_of(e: &Error) -> Option<&StorageError> {
    e.downcast_ref::<StorageError>()
}

pub fn is_retryable_storage_error(e: &Error) -> bool {
    storage_error_of(e).is_some_and(StorageError::is_retryable)
}

pub fn is_access_denied_error(e: &Error) -> bool {
    matches!(
        storage_error_of(e),
        Some(StorageError::AccessDenied(_)) | Some(StorageError::NotFound(_))
    ) || matches!(
        e.downcast_ref::<S3ArchiveError>(),
        Some(S3ArchiveError::Access(_))
    )
}

/// Check if an anyhow::Error wraps a cancellation error.
pub fn is_cancelled_error(e: &Error) -> bool {
    if let Some(err) = e.downcast_ref::<S3ArchiveError>() {
        return *err == S3ArchiveError::Cancelled;
    }
    false
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<S3ArchiveError>() {
        return err.exit_code();
    }
    1
}
