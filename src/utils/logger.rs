//! Logger setup for sync runs.

use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// Configure logging for a sync process. The default level keeps to
/// run-level lines (reports, escalations, conflicts); verbose mode adds the
/// per-triplet decision traces from the pipeline stages, tagged with the
/// stage that emitted them. Dependencies stay at warnings either way.
pub fn setup_logging(verbose: bool) {
    let own_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), own_level)
        .format(|buf, record| {
            let tag = match record.level() {
                Level::Error => "ERROR".red().to_string(),
                Level::Warn => "WARN".yellow().to_string(),
                Level::Info => env!("CARGO_PKG_NAME").cyan().to_string(),
                Level::Debug | Level::Trace => {
                    // `trisync::pipeline::processor` -> `processor`
                    let stage = record.target().rsplit("::").next().unwrap_or("sync");
                    stage.dimmed().to_string()
                }
            };
            writeln!(buf, "[{tag}] {}", record.args())
        })
        .init();
}
