use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_channel::Sender;

use crate::config::Config;
use crate::storage::Storage;
use crate::types::ArchiveStatistics;
use crate::types::token::PipelineCancellationToken;

/// Shared context handed to each phase of an archive run.
///
/// The scanner and the archive builder read from `source`; the upload and the
/// delete phase write to `target` and `source` respectively. Storages are
/// already wrapped in the retry layer.
#[derive(Clone)]
pub struct Stage {
    pub config: Config,
    pub source: Storage,
    pub target: Storage,
    pub stats_sender: Sender<ArchiveStatistics>,
    pub cancellation_token: PipelineCancellationToken,
    pub has_warning: Arc<AtomicBool>,
}

impl Stage {
    pub fn new(
        config: Config,
        source: Storage,
        target: Storage,
        stats_sender: Sender<ArchiveStatistics>,
        cancellation_token: PipelineCancellationToken,
        has_warning: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            stats_sender,
            cancellation_token,
            has_warning,
        }
    }

    /// Send a statistics event. A closed channel (no indicator) is ignored.
    pub async fn send_stats(&self, stats: ArchiveStatistics) {
        let _ = self.stats_sender.send(stats).await;
    }

    /// Set the warning flag to indicate a non-fatal issue occurred.
    pub fn set_warning(&self) {
        self.has_warning.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
