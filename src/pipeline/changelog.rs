//! Change-log ingestion: translate the server change feed since the last
//! persisted token into triplets, or decide the feed is unusable and bail
//! out to a crawler-driven full sync.

use log::{debug, info};
use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::remote::{ChangeEvent, ChangeType, strip_id_path_prefix};
use crate::types::{
    LocalView, SyncTriplet, RemoteView, canonical_name, parent_name, remote_rel,
};
use crate::utils::config::DropFirstEvent;

use super::context::SyncContext;
use super::deps::Outcome;

/// Result of one ingest attempt.
pub enum IngestOutcome {
    /// Local and server tokens are equal; nothing to do.
    Synced,
    /// A finite batch of triplets to push downstream. The token is persisted
    /// by the caller only after every triplet processed successfully.
    Incremental {
        triplets: Vec<SyncTriplet>,
        new_token: String,
    },
    /// The incremental path cannot be used; run the crawlers instead.
    EscalateToFull { reason: String },
}

/// Per-object ordered event lists, write-once per run.
#[derive(Default)]
struct EventBuffer {
    order: Vec<String>,
    events: HashMap<String, Vec<ChangeEvent>>,
}

impl EventBuffer {
    fn append(&mut self, event: ChangeEvent, window_ticks: i64) {
        if !self.events.contains_key(&event.object_id) {
            self.order.push(event.object_id.clone());
            self.events.insert(event.object_id.clone(), Vec::new());
        }
        let list = self
            .events
            .get_mut(&event.object_id)
            .expect("entry inserted above");
        append_coalesced(list, event, window_ticks);
    }

    fn drain(self) -> impl Iterator<Item = (String, Vec<ChangeEvent>)> {
        let mut events = self.events;
        self.order
            .into_iter()
            .filter_map(move |id| events.remove(&id).map(|list| (id, list)))
    }
}

/// Append an event to one object's list, collapsing an update that lands
/// within the coalescing window of the previous event into the later of the
/// two. Events without a timestamp are recorded unconditionally.
pub fn append_coalesced(list: &mut Vec<ChangeEvent>, event: ChangeEvent, window_ticks: i64) {
    if event.change_type == ChangeType::Updated
        && let (Some(prev), Some(ts)) = (list.last(), event.timestamp_ticks)
        && let Some(prev_ts) = prev.timestamp_ticks
        && ts - prev_ts < window_ticks
    {
        *list.last_mut().unwrap() = event;
        return;
    }
    list.push(event);
}

/// Read the change feed since the last local token and produce triplets, or
/// escalate. Only database and cancellation failures are returned as errors;
/// transport problems escalate.
pub fn ingest(ctx: &SyncContext) -> Result<IngestOutcome> {
    let server_token = match ctx.session.change_log_token() {
        Ok(token) => token,
        Err(err) => {
            return Ok(IngestOutcome::EscalateToFull {
                reason: format!("change-log token unavailable: {err}"),
            });
        }
    };
    let Some(local_token) = ctx.db.change_log_token()? else {
        return Ok(IngestOutcome::EscalateToFull {
            reason: "no prior token".to_string(),
        });
    };
    if local_token == server_token {
        debug!("change log: tokens equal, nothing to sync");
        return Ok(IngestOutcome::Synced);
    }

    let (buffer, last_token) = match collect_events(ctx, &local_token) {
        Ok(collected) => collected,
        Err(reason) => {
            // Cancellation aborts the run instead of escalating into a crawl.
            ctx.check_cancel()?;
            return Ok(IngestOutcome::EscalateToFull { reason });
        }
    };

    let mut triplets = Vec::new();
    let mut changed_names: HashSet<String> = HashSet::new();
    let mut tentative_parents: HashSet<String> = HashSet::new();

    for (raw_id, events) in buffer.drain() {
        ctx.check_cancel()?;
        if events.iter().any(|e| e.change_type == ChangeType::Updated) {
            // The incremental path intentionally does not handle content
            // updates.
            return Ok(IngestOutcome::EscalateToFull {
                reason: format!("update detected for {raw_id}"),
            });
        }
        let id = strip_id_path_prefix(&raw_id);
        let last = events.last().expect("buffered object with no events");
        match last.change_type {
            ChangeType::Created | ChangeType::Security => {
                match ctx.session.object_by_id(id) {
                    Ok(obj) => {
                        let Some(rel) = remote_rel(&obj.path, &ctx.remote_root) else {
                            debug!("change log: {id} outside sync root, skipped");
                            continue;
                        };
                        if rel.is_empty() {
                            continue; // the sync root itself is not an item
                        }
                        let leaf = rel.rsplit('/').next().unwrap_or(&rel);
                        if crate::engine::tools::is_ignored_name(leaf) {
                            continue;
                        }
                        let name = canonical_name(&rel, obj.is_folder);
                        changed_names.insert(name.clone());
                        let triplet =
                            SyncTriplet::new(name, obj.is_folder).with_remote(RemoteView {
                                id: obj.id,
                                rel_path: rel,
                                checksum: obj.checksum,
                                mtime_ns: obj.mtime_ns,
                                is_folder: obj.is_folder,
                            });
                        triplets.push(triplet);
                    }
                    // Not-found here is the normal sign the object has since
                    // been deleted, not an error.
                    Err(err) if err.is_not_found() => {
                        dispatch_deleted(
                            ctx,
                            id,
                            &mut triplets,
                            &mut changed_names,
                            &mut tentative_parents,
                        )?;
                    }
                    Err(err) => {
                        return Ok(IngestOutcome::EscalateToFull {
                            reason: format!("fetch of changed object {id} failed: {err}"),
                        });
                    }
                }
            }
            ChangeType::Deleted => {
                dispatch_deleted(
                    ctx,
                    id,
                    &mut triplets,
                    &mut changed_names,
                    &mut tentative_parents,
                )?;
            }
            ChangeType::Updated => unreachable!("updates escalate above"),
        }
    }

    // Parents that saw no change event of their own will not be processed
    // this run; resolve their edges so they cannot block the graph.
    for parent in &tentative_parents {
        if !changed_names.contains(parent) {
            ctx.deps.remove_all(parent, Outcome::Succeed);
        }
    }

    info!(
        "change log: {} triplets from {} changed objects",
        triplets.len(),
        changed_names.len()
    );
    Ok(IngestOutcome::Incremental {
        triplets,
        new_token: last_token.unwrap_or(server_token),
    })
}

/// Page through the change feed into the per-object buffer. Returns the
/// escalation reason as the error string.
fn collect_events(
    ctx: &SyncContext,
    local_token: &str,
) -> std::result::Result<(EventBuffer, Option<String>), String> {
    let mut buffer = EventBuffer::default();
    let mut cursor = local_token.to_string();
    let mut last_token: Option<String> = None;
    let mut first_page = true;

    loop {
        if ctx.cancelled() {
            return Err("sync cancelled".to_string());
        }
        let batch = ctx
            .session
            .content_changes(&cursor, true, ctx.config.max_changes_per_page)
            .map_err(|err| format!("change feed failed: {err}"))?;

        let drop_first = match ctx.config.drop_first_event {
            DropFirstEvent::Always => true,
            DropFirstEvent::NonFirstOnly => !first_page,
        };
        let mut events = batch.events.into_iter();
        if drop_first {
            // The server repeats the last-seen event as the first element of
            // the next page.
            events.next();
        }
        for event in events {
            buffer.append(event, ctx.config.coalesce_window_ticks);
        }

        if batch.has_more && batch.latest_token.is_none() {
            return Err("server too old".to_string());
        }
        if let Some(token) = batch.latest_token {
            cursor = token.clone();
            last_token = Some(token);
        }
        if !batch.has_more {
            break;
        }
        first_page = false;
    }
    Ok((buffer, last_token))
}

/// The object is gone on the server: look up its local path and produce a
/// deletion triplet, recording the parent dependency so the parent folder is
/// never deleted before its contents.
fn dispatch_deleted(
    ctx: &SyncContext,
    id: &str,
    triplets: &mut Vec<SyncTriplet>,
    changed_names: &mut HashSet<String>,
    tentative_parents: &mut HashSet<String>,
) -> Result<()> {
    let Some(row) = ctx.db.row_by_remote_id(id)? else {
        debug!("change log: delete for unknown object {id}, skipped");
        return Ok(());
    };
    let name = canonical_name(&row.local_rel_path, row.is_folder);
    changed_names.insert(name.clone());

    let mut triplet = SyncTriplet::new(name.clone(), row.is_folder);
    if let Some(local) = LocalView::from_disk(&ctx.local_root, &row.local_rel_path) {
        triplet = triplet.with_local(local);
    }
    triplet = triplet.with_db(row);

    if let Some(parent) = parent_name(&name) {
        ctx.deps.add(&parent, &name);
        tentative_parents.insert(parent);
    }
    triplets.push(triplet);
    Ok(())
}
