//! Remote crawler: walk the repository depth-first with `children` calls and
//! record every entry in a shared insertion-ordered buffer. Parents are
//! inserted before their children, so the assembler's leftover pass creates
//! folders before their contents. The crawler also builds the remote
//! dependency map (parent folder waits on each remote child) used when
//! remote-side deletion ordering matters.

use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};

use crate::engine::tools::is_ignored_name;
use crate::types::{
    SyncTriplet, RemoteView, canonical_name, lookup_key, parent_name, remote_rel,
};

use super::context::SyncContext;
use super::deps::ItemDependencies;

/// Insertion-ordered map of lookup key to remote semi-triplet, guarded by a
/// single mutex. The assembler takes joined keys out; whatever remains is
/// drained in insertion order at the end.
#[derive(Default)]
pub struct RemoteBuffer {
    inner: Mutex<OrderedEntries>,
}

#[derive(Default)]
struct OrderedEntries {
    order: Vec<String>,
    entries: HashMap<String, SyncTriplet>,
}

impl RemoteBuffer {
    pub fn new() -> RemoteBuffer {
        RemoteBuffer::default()
    }

    pub fn insert(&self, key: String, triplet: SyncTriplet) {
        let mut inner = self.inner.lock().expect("remote buffer poisoned");
        if !inner.entries.contains_key(&key) {
            inner.order.push(key.clone());
        }
        inner.entries.insert(key, triplet);
    }

    /// Remove and return the entry for `key`, if the crawler recorded it.
    pub fn take(&self, key: &str) -> Option<SyncTriplet> {
        let mut inner = self.inner.lock().expect("remote buffer poisoned");
        inner.entries.remove(key)
    }

    /// Remaining entries in insertion order; empties the buffer.
    pub fn drain_remaining(&self) -> Vec<SyncTriplet> {
        let mut inner = self.inner.lock().expect("remote buffer poisoned");
        let order = std::mem::take(&mut inner.order);
        order
            .into_iter()
            .filter_map(|key| inner.entries.remove(&key))
            .collect()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("remote buffer poisoned");
        inner.order.clear();
        inner.entries.clear();
    }
}

pub fn spawn_remote_crawler(
    ctx: Arc<SyncContext>,
    buffer: Arc<RemoteBuffer>,
    r_idps: Arc<ItemDependencies>,
) -> JoinHandle<Result<()>> {
    thread::spawn(move || crawl_remote(&ctx, &buffer, &r_idps))
}

fn crawl_remote(
    ctx: &SyncContext,
    buffer: &RemoteBuffer,
    r_idps: &ItemDependencies,
) -> Result<()> {
    ctx.check_cancel()?;
    let root = ctx
        .session
        .object_by_path(&ctx.remote_root)
        .with_context(|| format!("open remote root {}", ctx.remote_root))?;
    if !root.is_folder {
        return Err(anyhow!("remote root {} is not a folder", ctx.remote_root));
    }
    let mut count = 0usize;
    visit_folder(ctx, buffer, r_idps, &root.id, &mut count)?;
    debug!("remote crawl: {} entries buffered", count);
    Ok(())
}

fn visit_folder(
    ctx: &SyncContext,
    buffer: &RemoteBuffer,
    r_idps: &ItemDependencies,
    folder_id: &str,
    count: &mut usize,
) -> Result<()> {
    ctx.check_cancel()?;
    let children = ctx
        .session
        .children(folder_id)
        .with_context(|| format!("list remote folder {folder_id}"))?;

    for child in children {
        ctx.check_cancel()?;
        let Some(rel) = remote_rel(&child.path, &ctx.remote_root) else {
            continue;
        };
        let leaf = rel.rsplit('/').next().unwrap_or(&rel);
        if is_ignored_name(leaf) {
            continue;
        }
        let name = canonical_name(&rel, child.is_folder);
        let key = lookup_key(&name, ctx.case_insensitive());

        let mut triplet = SyncTriplet::new(name.clone(), child.is_folder);
        if let Some(row) = ctx.db.row_by_remote_id(&child.id)? {
            triplet = triplet.with_db(row);
        }
        let view = RemoteView {
            id: child.id.clone(),
            rel_path: rel,
            checksum: child.checksum.clone(),
            mtime_ns: child.mtime_ns,
            is_folder: child.is_folder,
        };
        triplet = triplet.with_remote(view);

        if let Some(parent) = parent_name(&name) {
            r_idps.add(&parent, &name);
        }
        buffer.insert(key, triplet);
        *count += 1;

        if child.is_folder {
            visit_folder(ctx, buffer, r_idps, &child.id, count)?;
        }
    }
    Ok(())
}
