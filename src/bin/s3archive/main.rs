use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use indicatif::HumanBytes;
use tracing::{debug, error, trace};

use s3archive_rs::config::Config;
use s3archive_rs::{
    ArchivePipeline, ArchiveReport, CLIArgs, create_pipeline_cancellation_token,
    exit_code_from_error, is_cancelled_error,
};

mod ctrl_c_handler;
pub mod indicator;
mod tracing_init;
pub mod ui_config;

const EXIT_CODE_WARNING: i32 = 3;

/// s3archive - Archive aged Amazon S3 objects into a single zip.
///
/// This binary is a thin wrapper over the s3archive-rs library.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "s3archive",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    let exit_code = run(config).await?;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err() -> Config {
    match Config::try_from(CLIArgs::parse()) {
        Ok(config) => config,
        Err(error_message) => {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit()
        }
    }
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return false;
    };

    tracing_init::init_tracing(tracing_config);
    true
}

/// Runs the pipeline and returns the process exit code.
async fn run(config: Config) -> Result<i32> {
    let cancellation_token = create_pipeline_cancellation_token();

    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let start_time = tokio::time::Instant::now();
    debug!("archive pipeline start.");

    let mut pipeline = match ArchivePipeline::new(config.clone(), cancellation_token).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("{e:#}");
            return Ok(exit_code_from_error(&e));
        }
    };
    let indicator_join_handle = indicator::show_indicator(
        pipeline.get_stats_receiver(),
        ui_config::is_progress_indicator_needed(&config),
        ui_config::is_show_result_needed(&config),
    );

    pipeline.run().await;
    indicator_join_handle.await?;

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());

    if let Some(errors) = pipeline.get_errors_and_consume() {
        if errors.iter().any(is_cancelled_error) {
            debug!("archive run cancelled by user.");
            return Ok(0);
        }
        for err in &errors {
            error!("{err:#}");
        }
        error!(
            duration_sec = duration_sec,
            stage = pipeline.failed_stage().map(|stage| stage.to_string()),
            "s3archive failed."
        );
        return Ok(errors.first().map(exit_code_from_error).unwrap_or(1));
    }

    if let Some(report) = pipeline.get_report() {
        if ui_config::is_show_result_needed(&config) {
            print_report(report);
        }
    }

    debug!(duration_sec = duration_sec, "s3archive has been completed.");

    if pipeline.has_warning() {
        return Ok(EXIT_CODE_WARNING);
    }

    Ok(0)
}

fn print_report(report: &ArchiveReport) {
    let Some(target_url) = report.target_url() else {
        println!("no objects to archive.");
        return;
    };

    println!("archive:           {target_url}");
    println!(
        "archived objects:  {} of {}",
        report.succeeded_count, report.candidate_count
    );
    for key in &report.failed_keys {
        println!("  failed:          {key}");
    }
    println!(
        "size:              {} -> {} ({:.1}% saved)",
        HumanBytes(report.original_bytes),
        HumanBytes(report.compressed_bytes),
        report.compression_ratio_percent()
    );
    if report.deletion_declined {
        println!("originals:         kept (deletion declined)");
    } else if report.deleted_count + report.delete_failed_count > 0 {
        println!(
            "originals:         {} deleted, {} failed",
            report.deleted_count, report.delete_failed_count
        );
    }
    println!("elapsed:           {:.3}s", report.elapsed_seconds);
}
