use anyhow::{Result, anyhow};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use tracing::{debug, info, warn};

use crate::stage::Stage;
use crate::types::error::S3ArchiveError;
use crate::types::{ArchiveEntry, ArchiveStatistics, CandidateObject};

pub mod entry_name;
pub mod writer;

use writer::{ArchiveSpool, ArchiveWriter, SealedArchive};

/// Result of fetching a single candidate. A failed fetch is a value, not an
/// error: it only excludes the key from the archive and from deletion.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched {
        candidate: CandidateObject,
        content: Bytes,
    },
    Failed {
        candidate: CandidateObject,
        error: String,
    },
}

/// What the builder hands to the upload phase.
#[derive(Debug)]
pub struct ArchiveOutput {
    pub archive: SealedArchive,
    pub entries: Vec<ArchiveEntry>,
    pub failed_keys: Vec<String>,
    pub original_bytes: u64,
    pub cancelled: bool,
}

impl ArchiveOutput {
    /// Keys that are in the archive, in archive order. Only these may ever be
    /// deleted.
    pub fn succeeded_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.source_key.clone())
            .collect()
    }

    pub fn compressed_bytes(&self) -> u64 {
        self.archive.len()
    }
}

/// Fetches candidates from the source and packs them into one container.
///
/// Up to `worker_size` fetches run at once, but results are consumed in
/// candidate order, so entry order never depends on which fetch finishes
/// first. Cancellation is checked between candidates; the container is
/// sealed in every case.
pub struct ArchiveBuilder {
    stage: Stage,
}

impl ArchiveBuilder {
    pub fn new(stage: Stage) -> Self {
        Self { stage }
    }

    pub async fn build(&self, candidates: &[CandidateObject]) -> Result<ArchiveOutput> {
        let spool = if self.stage.config.spool_to_disk {
            ArchiveSpool::TempFile
        } else {
            ArchiveSpool::Memory
        };
        let mut writer = ArchiveWriter::new(spool).map_err(to_finalization_error)?;

        debug!(
            candidates = candidates.len(),
            spool = ?spool,
            "archive build has started."
        );

        let worker_size = usize::from(self.stage.config.worker_size).max(1);
        let mut outcomes = stream::iter(candidates.iter().cloned())
            .map(|candidate| self.fetch(candidate))
            .buffered(worker_size);

        let mut failed_keys = Vec::new();
        let mut original_bytes: u64 = 0;
        let mut cancelled = false;

        loop {
            if self.stage.is_cancelled() {
                info!("archive build cancelled. sealing the archive.");
                cancelled = true;
                break;
            }

            let Some(outcome) = outcomes.next().await else {
                break;
            };

            match outcome {
                FetchOutcome::Fetched { candidate, content } => {
                    if content.len() as u64 != candidate.size() {
                        warn!(
                            key = candidate.key(),
                            listed_size = candidate.size(),
                            fetched_size = content.len(),
                            "object size changed since listing."
                        );
                    }

                    let entry = writer
                        .append(&candidate, &content)
                        .map_err(to_finalization_error)?;
                    original_bytes += entry.content_length;

                    debug!(
                        key = candidate.key(),
                        entry_name = entry.entry_name.as_str(),
                        size = entry.content_length,
                        "object archived."
                    );
                    self.stage
                        .send_stats(ArchiveStatistics::FetchComplete {
                            key: candidate.key().to_string(),
                        })
                        .await;
                }
                FetchOutcome::Failed { candidate, error } => {
                    warn!(
                        key = candidate.key(),
                        error = error.as_str(),
                        "failed to fetch object. it is excluded from the archive."
                    );
                    self.stage.set_warning();
                    failed_keys.push(candidate.key().to_string());
                    self.stage
                        .send_stats(ArchiveStatistics::FetchError {
                            key: candidate.key().to_string(),
                        })
                        .await;
                }
            }
        }
        drop(outcomes);

        let entries = writer.entries().to_vec();
        let archive = writer.finish().map_err(to_finalization_error)?;

        info!(
            entries = entries.len(),
            failed = failed_keys.len(),
            original_bytes = original_bytes,
            compressed_bytes = archive.len(),
            "archive has been sealed."
        );

        Ok(ArchiveOutput {
            archive,
            entries,
            failed_keys,
            original_bytes,
            cancelled,
        })
    }

    async fn fetch(&self, candidate: CandidateObject) -> FetchOutcome {
        match self.stage.source.get_object(candidate.key()).await {
            Ok(content) => {
                self.stage
                    .send_stats(ArchiveStatistics::FetchBytes(content.len() as u64))
                    .await;
                FetchOutcome::Fetched { candidate, content }
            }
            Err(e) => FetchOutcome::Failed {
                candidate,
                error: format!("{e:#}"),
            },
        }
    }
}

fn to_finalization_error(e: anyhow::Error) -> anyhow::Error {
    anyhow!(S3ArchiveError::Finalization(format!("{e:#}")))
}
