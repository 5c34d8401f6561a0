use anyhow::{Result, anyhow};
use tracing::{debug, info};

use crate::filters::is_candidate;
use crate::stage::Stage;
use crate::types::error::{S3ArchiveError, is_access_denied_error, is_cancelled_error};
use crate::types::{ArchiveStatistics, CandidateObject, SelectionCriteria};

/// Walks the source listing page by page and selects archive candidates.
///
/// ## Selection rule
///
/// Every listed object is judged by [`is_candidate`]. Accepted objects are
/// kept oldest first, at most `max_candidates` of them. Whole pages are
/// judged, so within what has been fetched the oldest eligible objects win;
/// once a page leaves the cap filled no further page is requested.
///
/// The result is sorted ascending by last_modified. The sort is stable, so
/// objects with the same timestamp keep their listing order.
pub struct ObjectScanner {
    stage: Stage,
}

impl ObjectScanner {
    pub fn new(stage: Stage) -> Self {
        Self { stage }
    }

    pub async fn scan(&self, criteria: &SelectionCriteria) -> Result<Vec<CandidateObject>> {
        debug!(
            bucket = self.stage.source.bucket(),
            prefix = criteria.prefix.as_deref(),
            cutoff = criteria.cutoff.to_rfc3339(),
            max_candidates = criteria.max_candidates,
            "scan has started."
        );

        let mut candidates: Vec<CandidateObject> = Vec::new();
        let mut continuation_token: Option<String> = None;
        let mut scanned_count: u64 = 0;
        let mut page_count: u64 = 0;

        loop {
            if self.stage.is_cancelled() {
                info!("scan cancelled.");
                return Err(anyhow!(S3ArchiveError::Cancelled));
            }

            let page = self
                .stage
                .source
                .list_objects(
                    criteria.prefix.as_deref(),
                    continuation_token.take(),
                    self.stage.config.max_keys,
                )
                .await
                .map_err(classify_scan_error)?;
            page_count += 1;

            for object in page.objects {
                scanned_count += 1;
                if !is_candidate(&object, criteria) {
                    continue;
                }

                candidates.push(CandidateObject::try_from(object)?);
            }

            keep_oldest(&mut candidates, criteria.max_candidates);

            if candidates.len() >= criteria.max_candidates {
                info!(
                    max_candidates = criteria.max_candidates,
                    "maximum number of candidates reached. stop scanning."
                );
                break;
            }

            match page.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        for candidate in &candidates {
            self.stage
                .send_stats(ArchiveStatistics::ScanAccepted {
                    key: candidate.key().to_string(),
                })
                .await;
        }

        info!(
            scanned = scanned_count,
            pages = page_count,
            candidates = candidates.len(),
            "scan has been completed."
        );

        Ok(candidates)
    }
}

/// Stable sort by age, then drop everything past `limit`.
fn keep_oldest(candidates: &mut Vec<CandidateObject>, limit: usize) {
    candidates.sort_by_key(|candidate| candidate.last_modified());
    candidates.truncate(limit);
}

fn classify_scan_error(e: anyhow::Error) -> anyhow::Error {
    if is_cancelled_error(&e) {
        return e;
    }
    if is_access_denied_error(&e) {
        return anyhow!(S3ArchiveError::Access(format!("{e:#}")));
    }
    anyhow!(S3ArchiveError::StorageUnavailable(format!("{e:#}")))
}
