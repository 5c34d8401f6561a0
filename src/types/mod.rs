use std::fmt;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeDelta, Utc};
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

use crate::types::error::S3ArchiveError;

pub mod error;
pub mod token;

/// Extension (lowercase) of the containers this tool produces.
///
/// Objects already carrying it are never selected again, so a run never
/// re-archives its own output.
pub const ARCHIVE_EXTENSION: &str = ".zip";

/// One entry of a bucket listing, before any eligibility decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
    pub e_tag: Option<String>,
}

impl ListedObject {
    pub fn new(key: &str, size: i64, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            size,
            last_modified,
            e_tag: None,
        }
    }
}

/// An object that passed every selection filter.
///
/// The invariants are checked once at construction: non-empty key, no
/// trailing `/`, no archive extension and a strictly positive size. A value
/// of this type therefore always names a real, non-empty data object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateObject {
    key: String,
    size: u64,
    last_modified: DateTime<Utc>,
    e_tag: Option<String>,
}

impl CandidateObject {
    pub fn new(
        key: &str,
        size: i64,
        last_modified: DateTime<Utc>,
        e_tag: Option<String>,
    ) -> Result<Self> {
        if key.is_empty() {
            return Err(anyhow!(S3ArchiveError::Pipeline(
                "candidate key must not be empty.".to_string()
            )));
        }
        if key.ends_with('/') {
            return Err(anyhow!(S3ArchiveError::Pipeline(format!(
                "directory marker cannot be a candidate: {key}"
            ))));
        }
        if has_archive_extension(key) {
            return Err(anyhow!(S3ArchiveError::Pipeline(format!(
                "archive object cannot be a candidate: {key}"
            ))));
        }
        if size <= 0 {
            return Err(anyhow!(S3ArchiveError::Pipeline(format!(
                "empty object cannot be a candidate: {key}"
            ))));
        }

        Ok(Self {
            key: key.to_string(),
            size: size as u64,
            last_modified,
            e_tag,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn e_tag(&self) -> Option<&str> {
        self.e_tag.as_deref()
    }
}

impl TryFrom<ListedObject> for CandidateObject {
    type Error = anyhow::Error;

    fn try_from(object: ListedObject) -> Result<Self> {
        CandidateObject::new(
            &object.key,
            object.size,
            object.last_modified,
            object.e_tag,
        )
    }
}

/// Case-insensitive check for the archive extension.
pub fn has_archive_extension(key: &str) -> bool {
    key.to_lowercase().ends_with(ARCHIVE_EXTENSION)
}

/// How old an object must be before it is archived.
///
/// A minutes value takes precedence over an hours value. With neither set the
/// window defaults to 24 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveAge {
    Minutes(u64),
    Hours(u64),
}

pub const DEFAULT_ARCHIVE_AGE_HOURS: u64 = 24;

impl ArchiveAge {
    pub fn resolve(minutes_back: Option<u64>, hours_back: Option<u64>) -> Self {
        match (minutes_back, hours_back) {
            (Some(minutes), _) => ArchiveAge::Minutes(minutes),
            (None, Some(hours)) => ArchiveAge::Hours(hours),
            (None, None) => ArchiveAge::Hours(DEFAULT_ARCHIVE_AGE_HOURS),
        }
    }

    pub fn amount(&self) -> u64 {
        match self {
            ArchiveAge::Minutes(amount) | ArchiveAge::Hours(amount) => *amount,
        }
    }

    /// The age window as a signed delta. Fails when the amount does not fit
    /// a `TimeDelta`.
    pub fn duration(&self) -> Result<TimeDelta> {
        let delta = match self {
            ArchiveAge::Minutes(minutes) => {
                i64::try_from(*minutes).ok().and_then(TimeDelta::try_minutes)
            }
            ArchiveAge::Hours(hours) => i64::try_from(*hours).ok().and_then(TimeDelta::try_hours),
        };

        delta.ok_or_else(|| {
            anyhow!(S3ArchiveError::InvalidConfig(format!(
                "archive age of {self} is out of range."
            )))
        })
    }

    /// `now` minus the age window. The result never lies after `now`.
    pub fn cutoff_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        now.checked_sub_signed(self.duration()?).ok_or_else(|| {
            anyhow!(S3ArchiveError::InvalidConfig(format!(
                "archive age of {self} reaches before the earliest supported time."
            )))
        })
    }
}

impl fmt::Display for ArchiveAge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveAge::Minutes(minutes) => write!(f, "{minutes} minute(s)"),
            ArchiveAge::Hours(hours) => write!(f, "{hours} hour(s)"),
        }
    }
}

/// The rules a listed object is judged against during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionCriteria {
    pub cutoff: DateTime<Utc>,
    pub prefix: Option<String>,
    pub max_candidates: usize,
}

impl SelectionCriteria {
    pub fn new(
        cutoff: DateTime<Utc>,
        prefix: Option<String>,
        max_candidates: usize,
    ) -> Result<Self> {
        if max_candidates == 0 {
            return Err(anyhow!(S3ArchiveError::InvalidConfig(
                "maximum number of files must be greater than 0.".to_string()
            )));
        }

        Ok(Self {
            cutoff,
            prefix: prefix.filter(|prefix| !prefix.is_empty()),
            max_candidates,
        })
    }
}

/// A named member of the produced container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub entry_name: String,
    pub content_length: u64,
    pub source_key: String,
}

/// Progress events consumed by the progress indicator.
#[derive(Debug, PartialEq)]
pub enum ArchiveStatistics {
    ScanAccepted { key: String },
    FetchComplete { key: String },
    FetchBytes(u64),
    FetchError { key: String },
    ArchiveUploaded { key: String, bytes: u64 },
    DeleteComplete { key: String },
    DeleteError { key: String },
}

/// S3 storage path specification.
#[derive(Debug, Clone)]
pub enum StoragePath {
    S3 { bucket: String, prefix: String },
}

impl StoragePath {
    pub fn bucket(&self) -> &str {
        match self {
            StoragePath::S3 { bucket, .. } => bucket,
        }
    }

    pub fn prefix(&self) -> &str {
        match self {
            StoragePath::S3 { prefix, .. } => prefix,
        }
    }
}

/// AWS configuration file locations.
#[derive(Debug, Clone)]
pub struct ClientConfigLocation {
    pub aws_config_file: Option<PathBuf>,
    pub aws_shared_credentials_file: Option<PathBuf>,
}

/// AWS credential sources.
#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

/// AWS access key pair with secure zeroization.
///
/// The secret_access_key and session_token are cleared from memory when this
/// struct is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}
