// Cancels the archive run on Ctrl+C. The pipeline stops at the next candidate
// or listing page, seals what it has and uploads nothing.

use s3archive_rs::PipelineCancellationToken;
use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, warn};

pub fn spawn_ctrl_c_handler(cancellation_token: PipelineCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("cancellation_token canceled.")
            }
            _ = signal::ctrl_c() => {
                warn!("ctrl-c received, stopping the archive run.");
                cancellation_token.cancel();
            }
        }
    })
}
