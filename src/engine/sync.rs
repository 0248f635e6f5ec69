//! Run orchestration: choose the incremental or crawler path, wire the
//! pipeline stages together, and advance the change-log token only when the
//! whole run came back clean.

use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};

use crate::engine::db_ops::SyncDatabase;
use crate::engine::tools::check_and_canonicalize;
use crate::pipeline::{
    Cancelled, IngestOutcome, ItemDependencies, RemoteBuffer, SyncContext, SyncReport,
    assemble_changelog, assemble_crawled, create_pipeline_channels, ingest, run_processor,
    spawn_local_crawler, spawn_remote_crawler,
};
use crate::remote::CmisSession;
use crate::types::SyncTriplet;
use crate::utils::SyncConfig;

/// One full synchronization pass: incremental when the change log allows it,
/// a crawler-driven reconciliation otherwise.
pub fn run_sync(
    session: Arc<dyn CmisSession>,
    db: Arc<SyncDatabase>,
    config: SyncConfig,
    local_root: &Path,
    remote_root: &str,
    cancel: Arc<AtomicBool>,
) -> Result<SyncReport> {
    let start = Instant::now();
    let local_root = check_and_canonicalize(local_root)?;
    let ctx = Arc::new(SyncContext {
        session,
        db,
        config,
        local_root,
        remote_root: remote_root.to_string(),
        deps: Arc::new(ItemDependencies::new()),
        cancel,
    });

    let mut report = match ingest(&ctx)? {
        IngestOutcome::Synced => {
            info!("tokens equal, nothing to sync");
            SyncReport::default()
        }
        IngestOutcome::Incremental { triplets, new_token } => {
            info!("incremental sync: {} triplets", triplets.len());
            let report = run_changelog_pass(&ctx, triplets)?;
            if report.is_clean() && !ctx.cancelled() {
                ctx.db.set_change_log_token(&new_token)?;
                debug!("change-log token advanced to {new_token}");
            }
            report
        }
        IngestOutcome::EscalateToFull { reason } => {
            info!("falling back to full sync: {reason}");
            // Edges recorded before the escalation belong to triplets that
            // will never run; the crawl rebuilds the graph from scratch.
            ctx.deps.clear();
            run_crawl_pass(&ctx)?
        }
    };

    report.duration_ms = start.elapsed().as_millis() as u64;
    Ok(report)
}

/// Push the ingester's triplets through the assembler into the worker pool.
fn run_changelog_pass(ctx: &Arc<SyncContext>, triplets: Vec<SyncTriplet>) -> Result<SyncReport> {
    let (full_tx, full_rx) = crossbeam_channel::bounded(ctx.config.channel_capacity());
    let proc_ctx = Arc::clone(ctx);
    let proc_handle = thread::spawn(move || run_processor(proc_ctx, full_rx));

    let asm_result = assemble_changelog(ctx, triplets, &full_tx);
    if asm_result.is_err() {
        ctx.cancel.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    drop(full_tx);

    let report = proc_handle
        .join()
        .map_err(|_| anyhow!("processor thread panicked"))?
        .context("processor failed")?;
    asm_result?;
    ctx.check_cancel()?;
    Ok(report)
}

/// Full reconciliation: both crawlers feed the assembler, which feeds the
/// worker pool. The server token read before crawling is persisted afterwards
/// so the next run can go incremental.
fn run_crawl_pass(ctx: &Arc<SyncContext>) -> Result<SyncReport> {
    let token_before = ctx.session.change_log_token().ok();

    let chans = create_pipeline_channels(ctx.config.channel_capacity());
    let buffer = Arc::new(RemoteBuffer::new());
    let r_idps = Arc::new(ItemDependencies::new());

    let proc_ctx = Arc::clone(ctx);
    let full_rx = chans.full_rx;
    let proc_handle = thread::spawn(move || run_processor(proc_ctx, full_rx));

    let local_handle = spawn_local_crawler(Arc::clone(ctx), chans.semi_tx);
    let remote_handle =
        spawn_remote_crawler(Arc::clone(ctx), Arc::clone(&buffer), Arc::clone(&r_idps));

    let asm_result = assemble_crawled(
        ctx,
        chans.semi_rx,
        &chans.full_tx,
        &buffer,
        &r_idps,
        remote_handle,
    );
    if asm_result.is_err() {
        ctx.cancel.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    drop(chans.full_tx);

    let local_result = local_handle
        .join()
        .map_err(|_| anyhow!("local crawler thread panicked"))?;
    let report = proc_handle
        .join()
        .map_err(|_| anyhow!("processor thread panicked"))?
        .context("processor failed")?;
    first_real_error(local_result, asm_result)?;
    ctx.check_cancel()?;

    if report.is_clean()
        && let Some(token) = token_before
    {
        ctx.db.set_change_log_token(&token)?;
        debug!("change-log token persisted after full sync");
    }
    Ok(report)
}

/// Surface the root cause when a stage failure cancelled the others: a
/// cancellation echo never outranks a real error.
fn first_real_error(local: Result<()>, asm: Result<()>) -> Result<()> {
    match (local, asm) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(err), Ok(())) => Err(err.context("local crawl failed")),
        (Ok(()), Err(err)) => Err(err),
        (Err(local_err), Err(asm_err)) => {
            if local_err.downcast_ref::<Cancelled>().is_some() {
                Err(asm_err)
            } else {
                Err(local_err.context("local crawl failed"))
            }
        }
    }
}
