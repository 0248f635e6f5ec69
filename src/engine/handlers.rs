//! Command handler: wire the CLI arguments into sync passes.

use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::engine::sync::run_sync;
use crate::engine::tools::setup_ctrlc_handler;
use crate::engine::{Cli, db_ops::SyncDatabase};
use crate::pipeline::SyncReport;
use crate::remote::FsSession;
use crate::utils::{SyncConfig, setup_logging};

/// Run one sync pass, or a poll loop when `--poll` is given.
pub fn handle_sync(cli: &Cli) -> Result<()> {
    setup_logging(cli.verbose);

    let config = SyncConfig {
        ignore_if_same_lowercase_names: cli.ignore_case,
        poll_interval: cli
            .poll
            .map(Duration::from_secs)
            .unwrap_or(SyncConfig::default().poll_interval),
        ..Default::default()
    };

    let db = Arc::new(SyncDatabase::open(&cli.db_path())?);
    let session = Arc::new(FsSession::new(&cli.remote)?);
    let cancel = setup_ctrlc_handler()?;

    let run_pass = || -> Result<SyncReport> {
        run_sync(
            session.clone(),
            db.clone(),
            config.clone(),
            &cli.dir,
            "/",
            cancel.clone(),
        )
    };

    if cli.poll.is_none() {
        let report = run_pass()?;
        log_report(&report);
        return Ok(());
    }

    if config.sync_at_startup {
        log_report(&run_pass()?);
    }
    loop {
        if sleep_or_cancel(&cancel, config.poll_interval) {
            info!("stopping poll loop");
            return Ok(());
        }
        match run_pass() {
            Ok(report) => log_report(&report),
            Err(err) => {
                if cancel.load(Ordering::Relaxed) {
                    info!("stopping poll loop");
                    return Ok(());
                }
                warn!("sync pass failed: {err:#}");
            }
        }
    }
}

/// Sleep for `interval` in short slices; true when cancellation arrived.
fn sleep_or_cancel(cancel: &Arc<AtomicBool>, interval: Duration) -> bool {
    let slice = Duration::from_millis(200);
    let mut remaining = interval;
    while remaining > Duration::ZERO {
        if cancel.load(Ordering::Relaxed) {
            return true;
        }
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining -= step;
    }
    cancel.load(Ordering::Relaxed)
}

fn log_report(report: &SyncReport) {
    info!(
        "sync done in {} ms: {} up | {} down | {} deleted | {} conflicts | {} refreshed | {} purged | {} failed | {} skipped",
        report.duration_ms,
        report.uploaded,
        report.downloaded,
        report.deleted,
        report.conflicts,
        report.refreshed,
        report.purged,
        report.failed,
        report.skipped,
    );
}
