// Whether the CLI draws the progress line and the final report.

use s3archive_rs::config::Config;

/// Returns `false` when `--show-no-progress` is set, when verbosity is above
/// warn (log lines would interleave with the bar) or when logs are JSON.
pub fn is_progress_indicator_needed(config: &Config) -> bool {
    if config.show_no_progress {
        return false;
    }

    match config.tracing_config {
        None => true,
        Some(tracing_config) => {
            tracing_config.tracing_level <= log::Level::Warn && !tracing_config.json_tracing
        }
    }
}

/// The report is printed at any verbosity, but never alongside JSON logs.
pub fn is_show_result_needed(config: &Config) -> bool {
    if config.show_no_progress {
        return false;
    }

    config
        .tracing_config
        .is_none_or(|tracing_config| !tracing_config.json_tracing)
}
