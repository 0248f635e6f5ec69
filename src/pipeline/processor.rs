//! Processor: pull full triplets off the bounded queue with a fixed worker
//! pool, classify each one, execute the action, update the database, then
//! release the item's edge in the dependency graph.
//!
//! Folder triplets whose deletion still waits on children are deferred and
//! picked up again once the graph reports them ready. Workers exit when the
//! queue is closed, the deferral list is drained, and the graph has settled.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::engine::hashing::{checksum_equals, hash_bytes, stored_checksum_equals};
use crate::remote::{RemoteError, RemoteObject};
use crate::types::{
    DbView, SyncTriplet, conflict_rel_path, parent_name, rel_of_name, remote_abs, remote_rel,
};
use crate::utils::config::{QueueConsts, RetryConsts};

use super::context::SyncContext;
use super::deps::{Outcome, Readiness};

/// Summary of one sync pass.
#[derive(Clone, Debug, Default)]
pub struct SyncReport {
    pub uploaded: u32,
    pub downloaded: u32,
    pub deleted: u32,
    pub conflicts: u32,
    pub refreshed: u32,
    pub purged: u32,
    pub failed: u32,
    pub skipped: u32,
    pub duration_ms: u64,
}

impl SyncReport {
    /// True when every produced triplet was executed successfully, which is
    /// what gates advancing the change-log token.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Action decided for one triplet from its three views.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SyncAction {
    UploadNew,
    DownloadNew,
    /// Same content on both sides; refresh stored mtimes only.
    Refresh,
    /// Same content but no (or stale) row; record the full row.
    Adopt,
    UploadChanged,
    DownloadChanged,
    /// Both sides changed: keep both via rename, then download.
    Conflict,
    DeleteRemote,
    DeleteLocal,
    /// Row exists but neither side does; drop the stale row.
    PurgeRow,
    /// Second local entry on a case-colliding key: keep-both rename.
    ResolveDuplicate,
}

#[derive(Clone, Copy, Debug)]
enum Done {
    Uploaded,
    Downloaded,
    Deleted,
    Conflicted,
    Refreshed,
    Purged,
}

#[derive(Default)]
struct Shared {
    deferred: Mutex<VecDeque<SyncTriplet>>,
    report: Mutex<SyncReport>,
    in_flight: AtomicUsize,
}

/// Run the worker pool over the full-triplet queue until everything drains.
pub fn run_processor(
    ctx: Arc<SyncContext>,
    full_rx: Receiver<SyncTriplet>,
) -> Result<SyncReport> {
    let shared = Arc::new(Shared::default());
    let width = ctx.config.worker_threads.max(1);
    debug!("processor: {} workers", width);

    let handles: Vec<JoinHandle<()>> = (0..width)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            let rx = full_rx.clone();
            let shared = Arc::clone(&shared);
            thread::spawn(move || worker_loop(&ctx, rx, &shared))
        })
        .collect();
    drop(full_rx);

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow!("processor worker panicked"))?;
    }
    let report = shared.report.lock().expect("report mutex poisoned").clone();
    Ok(report)
}

fn worker_loop(ctx: &SyncContext, rx: Receiver<SyncTriplet>, shared: &Shared) {
    loop {
        if ctx.cancelled() {
            // Drain without executing further actions.
            while rx.try_recv().is_ok() {}
            shared.deferred.lock().expect("deferred poisoned").clear();
            return;
        }

        if let Some(popped) = pop_deferred(ctx, shared) {
            match popped {
                Popped::Run(t) => run_one(ctx, shared, t),
                Popped::Skip(t) => skip_poisoned(ctx, shared, t),
            }
            continue;
        }

        match rx.recv_timeout(Duration::from_millis(QueueConsts::DEFER_POLL_MS)) {
            Ok(triplet) => dispatch(ctx, shared, triplet),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                let deferred_len = shared.deferred.lock().expect("deferred poisoned").len();
                if deferred_len == 0 && !ctx.deps.has_pending() {
                    return;
                }
                if shared.in_flight.load(Ordering::SeqCst) == 0 {
                    if deferred_len == 0 {
                        error!(
                            "dependency graph still has pending edges with no work left; \
                             ending run"
                        );
                        return;
                    }
                    // Nothing in flight can unblock the deferred items.
                    fail_one_stuck(ctx, shared);
                }
                // The channel is gone; pace the drain instead of spinning.
                thread::sleep(Duration::from_millis(QueueConsts::DEFER_POLL_MS));
            }
        }
    }
}

/// Queue closed, nothing in flight, nothing ready: the remaining deferred
/// items can never become ready on their own. Fail one so its edges resolve
/// and the drain keeps moving.
fn fail_one_stuck(ctx: &SyncContext, shared: &Shared) {
    let stuck = shared
        .deferred
        .lock()
        .expect("deferred poisoned")
        .pop_front();
    if let Some(triplet) = stuck {
        error!(
            "{} stuck waiting on {:?}; failing it",
            triplet.name,
            ctx.deps.dependencies_of(&triplet.name)
        );
        shared.report.lock().expect("report poisoned").failed += 1;
        resolve_parent(ctx, &triplet, Outcome::Fail);
        ctx.deps.remove_all(&triplet.name, Outcome::Fail);
    }
}

enum Popped {
    Run(SyncTriplet),
    Skip(SyncTriplet),
}

/// First deferred triplet whose gate has resolved, if any.
fn pop_deferred(ctx: &SyncContext, shared: &Shared) -> Option<Popped> {
    let mut deferred = shared.deferred.lock().expect("deferred poisoned");
    for i in 0..deferred.len() {
        match ctx.deps.readiness(&deferred[i].name) {
            Readiness::Ready => return deferred.remove(i).map(Popped::Run),
            Readiness::Poisoned => return deferred.remove(i).map(Popped::Skip),
            Readiness::Waiting => {}
        }
    }
    None
}

fn dispatch(ctx: &SyncContext, shared: &Shared, triplet: SyncTriplet) {
    if !triplet.is_valid() {
        debug_assert!(false, "triplet with no views reached the processor");
        return;
    }
    if !triplet.is_folder {
        run_one(ctx, shared, triplet);
        return;
    }
    match ctx.deps.readiness(&triplet.name) {
        Readiness::Ready => run_one(ctx, shared, triplet),
        Readiness::Poisoned => skip_poisoned(ctx, shared, triplet),
        Readiness::Waiting => {
            // Only deletions are ordered by the graph; creations and
            // refreshes proceed while their children are still pending.
            if is_deletion(&triplet) {
                shared
                    .deferred
                    .lock()
                    .expect("deferred poisoned")
                    .push_back(triplet);
            } else {
                run_one(ctx, shared, triplet);
            }
        }
    }
}

/// Deletion-shaped triplets are the ones the graph gates.
fn is_deletion(t: &SyncTriplet) -> bool {
    t.db.is_some() && (t.local.is_none() || t.remote.is_none())
}

fn run_one(ctx: &SyncContext, shared: &Shared, mut triplet: SyncTriplet) {
    shared.in_flight.fetch_add(1, Ordering::SeqCst);
    let outcome = decide_and_execute(ctx, &mut triplet);
    match outcome {
        Ok(done) => {
            record_done(shared, done);
            resolve_parent(ctx, &triplet, Outcome::Succeed);
        }
        Err(err) => {
            let budget = retry_budget(&err);
            if triplet.retries < budget {
                warn!(
                    "transport failure on {} (attempt {}): {err:#}",
                    triplet.name,
                    triplet.retries + 1
                );
                resolve_parent(ctx, &triplet, Outcome::Retry);
                let backoff = RetryConsts::BASE_BACKOFF_MS << triplet.retries;
                triplet.retries += 1;
                thread::sleep(Duration::from_millis(backoff));
                shared
                    .deferred
                    .lock()
                    .expect("deferred poisoned")
                    .push_back(triplet);
            } else {
                error!("processing {} failed: {err:#}", triplet.name);
                shared.report.lock().expect("report poisoned").failed += 1;
                resolve_parent(ctx, &triplet, Outcome::Fail);
            }
        }
    }
    shared.in_flight.fetch_sub(1, Ordering::SeqCst);
}

/// Remaining retries for the root cause of this failure: one for a timeout,
/// a few with backoff for other transient transport failures, none for the
/// rest.
fn retry_budget(err: &anyhow::Error) -> u32 {
    match err.downcast_ref::<RemoteError>() {
        Some(RemoteError::Timeout(_)) => RetryConsts::MAX_TIMEOUT_RETRIES,
        Some(RemoteError::Transient(_)) => RetryConsts::MAX_TRANSPORT_RETRIES,
        _ => 0,
    }
}

fn skip_poisoned(ctx: &SyncContext, shared: &Shared, triplet: SyncTriplet) {
    warn!(
        "skipping {}: failed dependencies {:?}",
        triplet.name,
        ctx.deps.dependencies_of(&triplet.name)
    );
    shared.report.lock().expect("report poisoned").skipped += 1;
    resolve_parent(ctx, &triplet, Outcome::Fail);
}

fn resolve_parent(ctx: &SyncContext, triplet: &SyncTriplet, outcome: Outcome) {
    if let Some(parent) = parent_name(&triplet.name) {
        ctx.deps.remove(&parent, &triplet.name, outcome);
    }
}

fn record_done(shared: &Shared, done: Done) {
    let mut report = shared.report.lock().expect("report poisoned");
    match done {
        Done::Uploaded => report.uploaded += 1,
        Done::Downloaded => report.downloaded += 1,
        Done::Deleted => report.deleted += 1,
        Done::Conflicted => report.conflicts += 1,
        Done::Refreshed => report.refreshed += 1,
        Done::Purged => report.purged += 1,
    }
}

fn decide_and_execute(ctx: &SyncContext, triplet: &mut SyncTriplet) -> Result<Done> {
    ctx.check_cancel()?;
    let action = classify(triplet)?;
    debug!("{} -> {:?}", triplet.name, action);
    execute(ctx, triplet, action)
}

/// The decision table: which action a triplet's views call for. Content
/// comparison is checksum-based; mtime alone is never authoritative. Folders
/// compare structurally (presence only).
fn classify(triplet: &mut SyncTriplet) -> Result<SyncAction> {
    if triplet.local_duplicate {
        return Ok(SyncAction::ResolveDuplicate);
    }
    let action = match (
        triplet.local.is_some(),
        triplet.db.is_some(),
        triplet.remote.is_some(),
    ) {
        (true, false, false) => SyncAction::UploadNew,
        (false, false, true) => SyncAction::DownloadNew,
        (false, true, true) => SyncAction::DeleteRemote,
        (true, true, false) => SyncAction::DeleteLocal,
        (false, true, false) => SyncAction::PurgeRow,
        (true, false, true) => {
            if triplet.is_folder {
                SyncAction::Adopt
            } else {
                let local_hash = triplet.local.as_mut().unwrap().content_hash()?;
                let remote_sum = &triplet.remote.as_ref().unwrap().checksum;
                if checksum_equals(&local_hash, remote_sum) {
                    SyncAction::Adopt
                } else {
                    SyncAction::Conflict
                }
            }
        }
        (true, true, true) => {
            if triplet.is_folder {
                SyncAction::Refresh
            } else {
                let local_hash = triplet.local.as_mut().unwrap().content_hash()?;
                let stored = &triplet.db.as_ref().unwrap().checksum;
                let remote_sum = &triplet.remote.as_ref().unwrap().checksum;
                let local_changed = !checksum_equals(&local_hash, stored);
                let remote_changed = !stored_checksum_equals(remote_sum, stored);
                match (local_changed, remote_changed) {
                    (false, false) => SyncAction::Refresh,
                    (true, false) => SyncAction::UploadChanged,
                    (false, true) => SyncAction::DownloadChanged,
                    (true, true) => {
                        if checksum_equals(&local_hash, remote_sum) {
                            // Both sides converged on the same content.
                            SyncAction::Adopt
                        } else {
                            SyncAction::Conflict
                        }
                    }
                }
            }
        }
        (false, false, false) => bail!("triplet {} has no views", triplet.name),
    };
    Ok(action)
}

fn execute(ctx: &SyncContext, triplet: &mut SyncTriplet, action: SyncAction) -> Result<Done> {
    match action {
        SyncAction::UploadNew => upload_new(ctx, triplet),
        SyncAction::DownloadNew => download_new(ctx, triplet),
        SyncAction::Refresh => refresh(ctx, triplet),
        SyncAction::Adopt => adopt(ctx, triplet),
        SyncAction::UploadChanged => upload_changed(ctx, triplet),
        SyncAction::DownloadChanged => download_changed(ctx, triplet),
        SyncAction::Conflict => resolve_conflict(ctx, triplet),
        SyncAction::DeleteRemote => delete_remote(ctx, triplet),
        SyncAction::DeleteLocal => delete_local(ctx, triplet),
        SyncAction::PurgeRow => purge_row(ctx, triplet),
        SyncAction::ResolveDuplicate => resolve_duplicate(ctx, triplet),
    }
}

/// Walk the remote folder chain for `rel`, creating what is missing.
fn ensure_remote_dir(ctx: &SyncContext, rel: &str) -> Result<RemoteObject> {
    ctx.check_cancel()?;
    let mut obj = ctx
        .session
        .object_by_path(&remote_abs(&ctx.remote_root, ""))
        .context("remote sync root unavailable")?;
    if rel.is_empty() {
        return Ok(obj);
    }
    let mut cur = String::new();
    for seg in rel.split('/') {
        ctx.check_cancel()?;
        let next = if cur.is_empty() {
            seg.to_string()
        } else {
            format!("{cur}/{seg}")
        };
        obj = match ctx.session.object_by_path(&remote_abs(&ctx.remote_root, &next)) {
            Ok(obj) => obj,
            Err(RemoteError::NotFound(_)) => ctx
                .session
                .create_folder(&remote_abs(&ctx.remote_root, &cur), seg)
                .with_context(|| format!("create remote folder {next}"))?,
            Err(err) => return Err(err).with_context(|| format!("lookup remote folder {next}")),
        };
        cur = next;
    }
    Ok(obj)
}

fn db_row_for(
    triplet: &SyncTriplet,
    remote: &RemoteObject,
    remote_root: &str,
    checksum: Option<Vec<u8>>,
) -> DbView {
    let rel = rel_of_name(&triplet.name).to_string();
    DbView {
        local_rel_path: rel.clone(),
        remote_id: remote.id.clone(),
        remote_rel_path: remote_rel(&remote.path, remote_root).unwrap_or(rel),
        checksum,
        local_mtime_ns: triplet.local.as_ref().map(|l| l.mtime_ns).unwrap_or(0),
        remote_mtime_ns: remote.mtime_ns,
        is_folder: remote.is_folder,
    }
}

fn upload_new(ctx: &SyncContext, triplet: &mut SyncTriplet) -> Result<Done> {
    ctx.check_cancel()?;
    let rel = rel_of_name(&triplet.name).to_string();
    if triplet.is_folder {
        let obj = ensure_remote_dir(ctx, &rel)?;
        ctx.db
            .record_upload(&db_row_for(triplet, &obj, &ctx.remote_root, None))?;
        return Ok(Done::Uploaded);
    }
    let local = triplet.local.as_mut().expect("upload without local view");
    let content = std::fs::read(&local.abs_path)
        .with_context(|| format!("read local file {}", local.abs_path.display()))?;
    let checksum = local.content_hash()?.map(|h| h.to_vec());
    let (parent_rel, leaf) = match rel.rfind('/') {
        Some(i) => (rel[..i].to_string(), &rel[i + 1..]),
        None => (String::new(), rel.as_str()),
    };
    ensure_remote_dir(ctx, &parent_rel)?;
    ctx.check_cancel()?;
    let obj = ctx
        .session
        .create_document(&remote_abs(&ctx.remote_root, &parent_rel), leaf, &content)
        .with_context(|| format!("create remote document {rel}"))?;
    ctx.db
        .record_upload(&db_row_for(triplet, &obj, &ctx.remote_root, checksum))?;
    Ok(Done::Uploaded)
}

fn download_new(ctx: &SyncContext, triplet: &mut SyncTriplet) -> Result<Done> {
    ctx.check_cancel()?;
    let remote = triplet.remote.clone().expect("download without remote view");
    let rel = rel_of_name(&triplet.name).to_string();
    let abs = ctx.local_root.join(&rel);
    if triplet.is_folder {
        std::fs::create_dir_all(&abs)
            .with_context(|| format!("create local folder {}", abs.display()))?;
    } else {
        let bytes = ctx
            .session
            .download(&remote.id)
            .with_context(|| format!("download {rel}"))?;
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create local folder {}", parent.display()))?;
        }
        std::fs::write(&abs, &bytes)
            .with_context(|| format!("write local file {}", abs.display()))?;
    }
    record_downloaded_row(ctx, triplet, &remote.id)?;
    Ok(Done::Downloaded)
}

/// Record (or re-record) the row for an item whose content now matches the
/// remote side.
fn record_downloaded_row(ctx: &SyncContext, triplet: &SyncTriplet, remote_id: &str) -> Result<()> {
    let rel = rel_of_name(&triplet.name).to_string();
    let remote = triplet.remote.as_ref().expect("record without remote view");
    let local_mtime_ns = crate::types::LocalView::from_disk(&ctx.local_root, &rel)
        .map(|l| l.mtime_ns)
        .unwrap_or(0);
    let checksum = if triplet.is_folder {
        None
    } else {
        match &remote.checksum {
            Some(sum) => Some(sum.clone()),
            None => {
                let abs = ctx.local_root.join(&rel);
                let meta = std::fs::metadata(&abs)?;
                crate::engine::hashing::hash_file(&abs, meta.len())?.map(|h| h.to_vec())
            }
        }
    };
    ctx.db.record_download(&DbView {
        local_rel_path: rel.clone(),
        remote_id: remote_id.to_string(),
        remote_rel_path: remote.rel_path.clone(),
        checksum,
        local_mtime_ns,
        remote_mtime_ns: remote.mtime_ns,
        is_folder: triplet.is_folder,
    })?;
    Ok(())
}

fn refresh(ctx: &SyncContext, triplet: &mut SyncTriplet) -> Result<Done> {
    let rel = rel_of_name(&triplet.name);
    let local_mtime = triplet.local.as_ref().map(|l| l.mtime_ns).unwrap_or(0);
    let remote_mtime = triplet.remote.as_ref().map(|r| r.mtime_ns).unwrap_or(0);
    ctx.db.refresh_mtimes(rel, local_mtime, remote_mtime)?;
    Ok(Done::Refreshed)
}

/// Local and remote already agree but the row is missing or stale: write the
/// full row without transferring anything.
fn adopt(ctx: &SyncContext, triplet: &mut SyncTriplet) -> Result<Done> {
    let remote = triplet.remote.as_ref().expect("adopt without remote view");
    let checksum = if triplet.is_folder {
        None
    } else {
        match &remote.checksum {
            Some(sum) => Some(sum.clone()),
            None => triplet
                .local
                .as_mut()
                .and_then(|l| l.content_hash().ok().flatten())
                .map(|h| h.to_vec()),
        }
    };
    let row = DbView {
        local_rel_path: rel_of_name(&triplet.name).to_string(),
        remote_id: remote.id.clone(),
        remote_rel_path: remote.rel_path.clone(),
        checksum,
        local_mtime_ns: triplet.local.as_ref().map(|l| l.mtime_ns).unwrap_or(0),
        remote_mtime_ns: remote.mtime_ns,
        is_folder: triplet.is_folder,
    };
    ctx.db.record_download(&row)?;
    Ok(Done::Refreshed)
}

fn upload_changed(ctx: &SyncContext, triplet: &mut SyncTriplet) -> Result<Done> {
    ctx.check_cancel()?;
    let local = triplet.local.as_mut().expect("upload without local view");
    let content = std::fs::read(&local.abs_path)
        .with_context(|| format!("read local file {}", local.abs_path.display()))?;
    let checksum = local.content_hash()?.map(|h| h.to_vec());
    let remote = triplet.remote.as_ref().expect("upload without remote view");
    let obj = ctx
        .session
        .upload(&remote.id, &content)
        .with_context(|| format!("upload {}", triplet.name))?;
    ctx.db
        .record_upload(&db_row_for(triplet, &obj, &ctx.remote_root, checksum))?;
    Ok(Done::Uploaded)
}

fn download_changed(ctx: &SyncContext, triplet: &mut SyncTriplet) -> Result<Done> {
    ctx.check_cancel()?;
    let remote = triplet.remote.clone().expect("download without remote view");
    let rel = rel_of_name(&triplet.name).to_string();
    let abs = ctx.local_root.join(&rel);
    let bytes = ctx
        .session
        .download(&remote.id)
        .with_context(|| format!("download {rel}"))?;
    std::fs::write(&abs, &bytes).with_context(|| format!("write local file {}", abs.display()))?;
    record_downloaded_row(ctx, triplet, &remote.id)?;
    Ok(Done::Downloaded)
}

/// Keep both: move the local file aside under a conflict name, upload the
/// moved copy as its own document, then take the server content under the
/// original name. Never fatal, never loses data.
fn resolve_conflict(ctx: &SyncContext, triplet: &mut SyncTriplet) -> Result<Done> {
    ctx.check_cancel()?;
    let rel = rel_of_name(&triplet.name).to_string();
    let conflict_rel = keep_both_rename(ctx, &rel)?;
    info!("conflict on {}: local copy kept as {}", rel, conflict_rel);
    ctx.db.record_rename(&rel, &conflict_rel)?;

    upload_conflict_copy(ctx, &conflict_rel)?;

    // Now take the server side under the original name.
    let remote = triplet.remote.clone().expect("conflict without remote view");
    let bytes = ctx
        .session
        .download(&remote.id)
        .with_context(|| format!("download {rel}"))?;
    let abs = ctx.local_root.join(&rel);
    if let Some(parent) = abs.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&abs, &bytes).with_context(|| format!("write local file {}", abs.display()))?;
    record_downloaded_row(ctx, triplet, &remote.id)?;
    Ok(Done::Conflicted)
}

/// Rename `rel` to its conflict name on disk; returns the new relative path.
fn keep_both_rename(ctx: &SyncContext, rel: &str) -> Result<String> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let conflict_rel = conflict_rel_path(rel, now);
    let from = ctx.local_root.join(rel);
    let to = ctx.local_root.join(&conflict_rel);
    std::fs::rename(&from, &to)
        .with_context(|| format!("rename {} to {}", from.display(), to.display()))?;
    Ok(conflict_rel)
}

/// Upload the renamed conflict copy as a new document and record its row.
fn upload_conflict_copy(ctx: &SyncContext, conflict_rel: &str) -> Result<()> {
    ctx.check_cancel()?;
    let abs = ctx.local_root.join(conflict_rel);
    let content =
        std::fs::read(&abs).with_context(|| format!("read conflict copy {}", abs.display()))?;
    let (parent_rel, leaf) = match conflict_rel.rfind('/') {
        Some(i) => (conflict_rel[..i].to_string(), &conflict_rel[i + 1..]),
        None => (String::new(), conflict_rel),
    };
    let obj = ctx
        .session
        .create_document(&remote_abs(&ctx.remote_root, &parent_rel), leaf, &content)
        .with_context(|| format!("upload conflict copy {conflict_rel}"))?;
    let meta = std::fs::metadata(&abs)?;
    let local_mtime_ns = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    ctx.db.record_upload(&DbView {
        local_rel_path: conflict_rel.to_string(),
        remote_id: obj.id.clone(),
        remote_rel_path: remote_rel(&obj.path, &ctx.remote_root)
            .unwrap_or_else(|| conflict_rel.to_string()),
        checksum: Some(hash_bytes(&content).to_vec()),
        local_mtime_ns,
        remote_mtime_ns: obj.mtime_ns,
        is_folder: false,
    })?;
    Ok(())
}

fn delete_remote(ctx: &SyncContext, triplet: &mut SyncTriplet) -> Result<Done> {
    ctx.check_cancel()?;
    let row = triplet.db.as_ref().expect("delete-remote without db view");
    let id = triplet
        .remote
        .as_ref()
        .map(|r| r.id.clone())
        .unwrap_or_else(|| row.remote_id.clone());
    match ctx.session.delete_object(&id) {
        Ok(()) => {}
        Err(RemoteError::NotFound(_)) => {} // already gone
        Err(err) => return Err(err).with_context(|| format!("delete remote {}", triplet.name)),
    }
    ctx.db.record_delete(&row.local_rel_path)?;
    Ok(Done::Deleted)
}

fn delete_local(ctx: &SyncContext, triplet: &mut SyncTriplet) -> Result<Done> {
    let rel = rel_of_name(&triplet.name).to_string();
    let abs = ctx.local_root.join(&rel);
    let result = if triplet.is_folder {
        // Contents were ordered first by the graph; the folder is empty now.
        std::fs::remove_dir(&abs)
    } else {
        std::fs::remove_file(&abs)
    };
    match result {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("delete local {}", abs.display()));
        }
    }
    ctx.db.record_delete(&rel)?;
    Ok(Done::Deleted)
}

fn purge_row(ctx: &SyncContext, triplet: &mut SyncTriplet) -> Result<Done> {
    let row = triplet.db.as_ref().expect("purge without db view");
    ctx.db.record_delete(&row.local_rel_path)?;
    Ok(Done::Purged)
}

/// A second local entry collided on the lookup key: keep it under a conflict
/// name and upload that copy as its own document.
fn resolve_duplicate(ctx: &SyncContext, triplet: &mut SyncTriplet) -> Result<Done> {
    ctx.check_cancel()?;
    let rel = rel_of_name(&triplet.name).to_string();
    let conflict_rel = keep_both_rename(ctx, &rel)?;
    info!(
        "case-colliding local entry {} kept as {}",
        rel, conflict_rel
    );
    if !triplet.is_folder {
        upload_conflict_copy(ctx, &conflict_rel)?;
    }
    Ok(Done::Conflicted)
}
