//! Local crawler: walk the sync root depth-first and emit semi-triplets with
//! the local (and, when recorded, database) view populated. A second pass
//! over the database surfaces items that vanished from disk so deletions are
//! detected.

use crossbeam_channel::Sender;
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use walkdir::WalkDir;

use crate::engine::tools::{is_ignored_name, path_relative_to};
use crate::types::{LocalView, SyncTriplet, canonical_name, parent_name, to_slash};

use super::context::SyncContext;

pub fn spawn_local_crawler(
    ctx: Arc<SyncContext>,
    semi_tx: Sender<SyncTriplet>,
) -> JoinHandle<Result<()>> {
    thread::spawn(move || {
        let result = crawl_local(&ctx, semi_tx);
        if result.is_err() {
            // Wind the rest of the pipeline down; the error surfaces on join.
            ctx.cancel
                .store(true, std::sync::atomic::Ordering::Relaxed);
        }
        result
    })
}

fn crawl_local(ctx: &SyncContext, semi_tx: Sender<SyncTriplet>) -> Result<()> {
    let mut seen: HashSet<String> = HashSet::new();

    let walker = WalkDir::new(&ctx.local_root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.path() == ctx.local_root
                || e.file_name()
                    .to_str()
                    .map(|n| !is_ignored_name(n))
                    .unwrap_or(false)
        });

    for entry in walker {
        ctx.check_cancel()?;
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Permission denied or error accessing path: {}", err);
                continue;
            }
        };
        if entry.path() == ctx.local_root {
            continue;
        }
        let Some(rel) = path_relative_to(entry.path(), &ctx.local_root) else {
            continue;
        };
        let rel = to_slash(&rel);
        let is_folder = entry.file_type().is_dir();
        if !is_folder && !entry.file_type().is_file() {
            continue; // sockets, fifos, dangling links
        }
        let name = canonical_name(&rel, is_folder);

        let mut triplet = SyncTriplet::new(name.clone(), is_folder);
        if let Some(local) = LocalView::from_disk(&ctx.local_root, &rel) {
            triplet = triplet.with_local(local);
        } else {
            continue; // vanished between walk and stat
        }
        if let Some(row) = ctx.db.row_by_local_path(&rel)? {
            triplet = triplet.with_db(row);
        }
        seen.insert(name);
        if semi_tx.send(triplet).is_err() {
            return Ok(()); // assembler gone; it reports its own error
        }
    }

    emit_db_only(ctx, &semi_tx, &seen)?;
    drop(semi_tx);
    Ok(())
}

/// Items recorded by the previous sync but absent from the walk: these are
/// deletion candidates. Their parent edges are registered before any of them
/// is emitted so a folder can never be processed ahead of its contents.
fn emit_db_only(
    ctx: &SyncContext,
    semi_tx: &Sender<SyncTriplet>,
    seen: &HashSet<String>,
) -> Result<()> {
    let mut missing = Vec::new();
    for rel in ctx.db.all_local_paths()? {
        ctx.check_cancel()?;
        let Some(row) = ctx.db.row_by_local_path(&rel)? else {
            continue;
        };
        let name = canonical_name(&rel, row.is_folder);
        if seen.contains(&name) {
            continue;
        }
        missing.push((name, row));
    }

    for (name, _) in &missing {
        if let Some(parent) = parent_name(name) {
            ctx.deps.add(&parent, name);
        }
    }
    debug!("local crawl: {} db-only deletion candidates", missing.len());

    for (name, row) in missing {
        ctx.check_cancel()?;
        let is_folder = row.is_folder;
        // No local view: a recorded path the walk did not see counts as gone,
        // whether it was deleted or is now filtered.
        let triplet = SyncTriplet::new(name, is_folder).with_db(row);
        if semi_tx.send(triplet).is_err() {
            return Ok(());
        }
    }
    Ok(())
}
