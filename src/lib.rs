/*!
# Overview
s3archive-rs bundles aged objects of an Amazon S3 bucket into a single ZIP
archive, uploads it, and optionally deletes the originals.

## Features
- **Age-based selection**: objects older than N minutes or hours, oldest first, capped per run
- **Streaming build**: objects are fetched in parallel and appended in selection order
- **Safe deletion**: only keys that made it into an uploaded archive are ever deleted
- **Batch deletes**: DeleteObjects with up to 1000 keys per request, per-key fallback
- **Library-First**: the s3archive CLI is a thin wrapper over this library

## As a Library

```toml
[dependencies]
s3archive-rs = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use s3archive_rs::config::args::parse_from_args;
use s3archive_rs::{ArchivePipeline, Config, create_pipeline_cancellation_token};

#[tokio::main]
async fn main() {
    let args = vec!["s3archive", "s3://my-bucket/logs/", "--hours-back", "48", "--force"];

    let parsed_args = parse_from_args(args).unwrap();
    let config = Config::try_from(parsed_args).unwrap();
    let cancellation_token = create_pipeline_cancellation_token();
    let mut pipeline = ArchivePipeline::new(config, cancellation_token).await.unwrap();
    pipeline.close_stats_sender();
    pipeline.run().await;

    if pipeline.has_error() {
        eprintln!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
    }
}
```

Or, without managing the pipeline yourself:

```no_run
# async fn example() {
use s3archive_rs::{Config, create_pipeline_cancellation_token, run_archive};

match run_archive(Config::for_source("my-bucket", ""), create_pipeline_cancellation_token()).await {
    Ok(report) => println!("saved {} bytes", report.space_saved()),
    Err(failure) => eprintln!("{failure}"),
}
# }
```
*/

#![allow(clippy::collapsible_if)]

pub mod archive;
pub mod config;
pub mod deleter;
pub mod filters;
pub mod pipeline;
pub mod safety;
pub mod scanner;
pub mod stage;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::Config;
pub use config::args::CLIArgs;
pub use pipeline::{ArchivePipeline, ArchiveReport, PipelineState, RunFailure, run_archive};
pub use types::error::{S3ArchiveError, exit_code_from_error, is_cancelled_error};
pub use types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};
pub use types::{ArchiveAge, ArchiveStatistics};
