//! Assembler: join semi-triplets from the two sides into full triplets and
//! push each canonical key downstream exactly once.

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result, anyhow};

use crate::remote::RemoteError;
use crate::types::{
    LocalView, SyncTriplet, RemoteView, lookup_key, rel_of_name, remote_abs, remote_rel,
};

use super::context::SyncContext;
use super::deps::ItemDependencies;
use super::remote_crawler::RemoteBuffer;

/// Change-log mode: the ingester already produced full-enough triplets; pass
/// them through, enriching with the database and local views where the
/// ingester only had a remote id.
pub fn assemble_changelog(
    ctx: &SyncContext,
    triplets: Vec<SyncTriplet>,
    full_tx: &Sender<SyncTriplet>,
) -> Result<()> {
    let mut processed: HashSet<String> = HashSet::new();
    for mut triplet in triplets {
        ctx.check_cancel()?;
        let key = lookup_key(&triplet.name, ctx.case_insensitive());
        if !processed.insert(key) {
            continue;
        }
        if triplet.db.is_none()
            && let Some(remote) = &triplet.remote
        {
            triplet.db = ctx.db.row_by_remote_id(&remote.id)?;
        }
        if triplet.local.is_none()
            && let Some(row) = &triplet.db
            && let Some(local) = LocalView::from_disk(&ctx.local_root, &row.local_rel_path)
        {
            triplet.local = Some(local);
        }
        if full_tx.send(triplet).is_err() {
            break; // processor gone; its error surfaces on join
        }
    }
    Ok(())
}

/// Crawler mode: consume the local semi-triplet queue inline while the remote
/// crawler fills the ordered buffer, then emit remote-only leftovers in
/// insertion order.
pub fn assemble_crawled(
    ctx: &Arc<SyncContext>,
    semi_rx: Receiver<SyncTriplet>,
    full_tx: &Sender<SyncTriplet>,
    buffer: &RemoteBuffer,
    r_idps: &ItemDependencies,
    remote_handle: JoinHandle<Result<()>>,
) -> Result<()> {
    let mut processed: HashSet<String> = HashSet::new();

    while let Ok(mut triplet) = semi_rx.recv() {
        ctx.check_cancel()?;
        let key = lookup_key(&triplet.name, ctx.case_insensitive());
        if processed.contains(&key) {
            // A second local entry colliding on the lookup key under a
            // case-insensitive server; the processor resolves it by a
            // keep-both rename.
            if triplet.local.is_some() {
                triplet.local_duplicate = true;
                triplet.db = None;
                triplet.remote = None;
                if full_tx.send(triplet).is_err() {
                    break;
                }
            }
            continue;
        }
        processed.insert(key.clone());

        if let Some(remote_semi) = buffer.take(&key) {
            triplet.remote = remote_semi.remote;
            if triplet.db.is_none() {
                triplet.db = remote_semi.db;
            }
        } else {
            lookup_remote_directly(ctx, &mut triplet)?;
        }

        if full_tx.send(triplet).is_err() {
            break;
        }
    }

    remote_handle
        .join()
        .map_err(|_| anyhow!("remote crawler thread panicked"))?
        .context("remote crawl failed")?;

    // Everything the remote crawler recorded that no local entry claimed:
    // remote-only items, emitted parents-first by insertion order. Folder
    // edges are merged before the children they gate are emitted.
    let leftovers = buffer.drain_remaining();
    debug!("assembler: {} remote-only leftovers", leftovers.len());
    for triplet in leftovers {
        ctx.check_cancel()?;
        let key = lookup_key(&triplet.name, ctx.case_insensitive());
        if !processed.insert(key) {
            continue;
        }
        if triplet.is_folder {
            for child in r_idps.dependencies_of(&triplet.name) {
                if !processed.contains(&lookup_key(&child, ctx.case_insensitive())) {
                    ctx.deps.add(&triplet.name, &child);
                }
            }
        }
        if full_tx.send(triplet).is_err() {
            break;
        }
    }

    buffer.clear();
    r_idps.clear();
    Ok(())
}

/// No buffered entry for this key yet: ask the server directly, preferring
/// the recorded remote path over the assumed mirror of the local one.
fn lookup_remote_directly(ctx: &SyncContext, triplet: &mut SyncTriplet) -> Result<()> {
    ctx.check_cancel()?;
    let rel = triplet
        .db
        .as_ref()
        .map(|row| row.remote_rel_path.clone())
        .unwrap_or_else(|| rel_of_name(&triplet.name).to_string());
    let path = remote_abs(&ctx.remote_root, &rel);
    match ctx.session.object_by_path(&path) {
        Ok(obj) => {
            if obj.is_folder != triplet.is_folder {
                warn!(
                    "remote object at {} is a {} while the local item is not; treating as absent",
                    path,
                    if obj.is_folder { "folder" } else { "document" }
                );
                return Ok(());
            }
            let rel = remote_rel(&obj.path, &ctx.remote_root).unwrap_or(rel);
            triplet.remote = Some(RemoteView {
                id: obj.id,
                rel_path: rel,
                checksum: obj.checksum,
                mtime_ns: obj.mtime_ns,
                is_folder: obj.is_folder,
            });
            Ok(())
        }
        Err(RemoteError::NotFound(_)) => Ok(()),
        Err(err) => Err(err).with_context(|| format!("lookup of remote path {path} failed")),
    }
}
