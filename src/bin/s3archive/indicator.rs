// Progress line for an archive run.
//
// Reads ArchiveStatistics from the pipeline's stats channel and redraws once
// per second until the channel is closed.

use std::io;
use std::io::Write;

use async_channel::Receiver;
use indicatif::{HumanBytes, HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use s3archive_rs::ArchiveStatistics;
use simple_moving_average::{SMA, SumTreeSMA};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

/// Totals seen on the stats channel, returned once it closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorSummary {
    pub scanned_count: u64,
    pub fetched_count: u64,
    pub fetched_bytes: u64,
    pub fetch_error_count: u64,
    pub archive_key: Option<String>,
    pub archive_bytes: u64,
    pub deleted_count: u64,
    pub delete_error_count: u64,
}

impl IndicatorSummary {
    fn apply(&mut self, stats: ArchiveStatistics) -> u64 {
        match stats {
            ArchiveStatistics::ScanAccepted { .. } => self.scanned_count += 1,
            ArchiveStatistics::FetchComplete { .. } => {
                self.fetched_count += 1;
                return 1;
            }
            ArchiveStatistics::FetchBytes(size) => self.fetched_bytes += size,
            ArchiveStatistics::FetchError { .. } => self.fetch_error_count += 1,
            ArchiveStatistics::ArchiveUploaded { key, bytes } => {
                self.archive_key = Some(key);
                self.archive_bytes = bytes;
            }
            ArchiveStatistics::DeleteComplete { .. } => self.deleted_count += 1,
            ArchiveStatistics::DeleteError { .. } => self.delete_error_count += 1,
        }
        0
    }

    fn progress_message(&self) -> String {
        format!(
            "selected {} | archived {:>3} objects ({}), error {}  | deleted {}, delete error {}",
            HumanCount(self.scanned_count),
            HumanCount(self.fetched_count),
            HumanBytes(self.fetched_bytes),
            self.fetch_error_count,
            self.deleted_count,
            self.delete_error_count,
        )
    }
}

const MOVING_AVERAGE_PERIOD_SECS: usize = 10;

const REFRESH_INTERVAL: f32 = 1.0;

fn text_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Spawn the indicator task. It ends when every sender of `stats_receiver`
/// is closed; await the handle after the pipeline returns.
pub fn show_indicator(
    stats_receiver: Receiver<ArchiveStatistics>,
    show_progress: bool,
    show_result: bool,
) -> JoinHandle<IndicatorSummary> {
    let progress_text = ProgressBar::new(0);
    progress_text.set_style(text_style("{wide_msg}"));

    tokio::spawn(async move {
        let start_time = Instant::now();

        let mut ma_fetched_count = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();
        let mut summary = IndicatorSummary::default();

        loop {
            let mut period_count: u64 = 0;

            let period = Instant::now();
            loop {
                while let Ok(stats) = stats_receiver.try_recv() {
                    period_count += summary.apply(stats);
                }

                if REFRESH_INTERVAL < period.elapsed().as_secs_f32() {
                    break;
                }

                if stats_receiver.is_closed() && stats_receiver.is_empty() {
                    let elapsed = start_time.elapsed();

                    info!(
                        message = "archive progress summary",
                        selected = summary.scanned_count,
                        archived_objects = summary.fetched_count,
                        archived_bytes = summary.fetched_bytes,
                        fetch_error = summary.fetch_error_count,
                        archive_bytes = summary.archive_bytes,
                        deleted = summary.deleted_count,
                        delete_error = summary.delete_error_count,
                        duration_sec = elapsed.as_secs_f64(),
                    );

                    if show_result {
                        progress_text.set_style(text_style("{msg}"));
                        progress_text.finish_with_message(format!(
                            "{},  duration {}",
                            summary.progress_message(),
                            HumanDuration(elapsed),
                        ));

                        println!();
                        let _ = io::stdout().flush();
                    }

                    return summary;
                }

                tokio::time::sleep(std::time::Duration::from_secs_f32(0.05)).await;
            }

            ma_fetched_count.add_sample(period_count);

            if show_progress {
                progress_text.set_message(format!(
                    "{} | {:>3} objects/sec",
                    summary.progress_message(),
                    HumanCount(ma_fetched_count.get_average()),
                ));
            }
        }
    })
}
