//! Trisync: bidirectional file sync between a local tree and a CMIS-like
//! repository, built around a triplet pipeline.
//!
//! Every syncable item is reconciled from up to three views (local
//! filesystem, prior-sync database, remote server) joined into a
//! [`SyncTriplet`], decided once, and executed under the dependency graph's
//! deletion ordering. Sync runs are incremental when the server change log
//! allows it and fall back to a crawler-driven full pass otherwise.

pub mod engine;
pub mod pipeline;
pub mod remote;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use pipeline::SyncReport;
pub use utils::SyncConfig;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use engine::db_ops::SyncDatabase;
use remote::CmisSession;

/// Result alias used by the public trisync API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: run one sync pass of `local_root` against
/// `remote_root` on `session`, recording state in `db`.
///
/// The pass is incremental (change-log driven) when the server provides a
/// usable feed and the previous token is known, and a full crawler-driven
/// reconciliation otherwise. The change-log token advances only when the
/// whole pass succeeds. `cancel` is polled at queue interactions and before
/// network calls; set it to wind the pass down without committing a token.
pub fn sync_once(
    session: Arc<dyn CmisSession>,
    db: Arc<SyncDatabase>,
    local_root: &Path,
    remote_root: &str,
    config: &SyncConfig,
    cancel: Arc<AtomicBool>,
) -> Result<SyncReport> {
    engine::sync::run_sync(session, db, config.clone(), local_root, remote_root, cancel)
}
