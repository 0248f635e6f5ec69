//! Shared context and channel plumbing for one sync run.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use crate::engine::db_ops::SyncDatabase;
use crate::remote::CmisSession;
use crate::types::SyncTriplet;
use crate::utils::SyncConfig;

use super::deps::ItemDependencies;

/// Cancellation was requested; no further state is committed.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("sync cancelled")]
pub struct Cancelled;

/// Everything a pipeline stage needs for one run: the session, the database,
/// the frozen configuration, the roots, the dependency graph, and the
/// cancellation token. Built once per sync pass.
pub struct SyncContext {
    pub session: Arc<dyn CmisSession>,
    pub db: Arc<SyncDatabase>,
    pub config: SyncConfig,
    /// Canonicalized local sync root.
    pub local_root: PathBuf,
    /// Absolute remote path the local root mirrors.
    pub remote_root: String,
    pub deps: Arc<ItemDependencies>,
    pub cancel: Arc<AtomicBool>,
}

impl SyncContext {
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Return an error if cancellation was requested; polled at queue
    /// interactions and before network calls.
    pub fn check_cancel(&self) -> Result<()> {
        if self.cancelled() {
            return Err(Cancelled.into());
        }
        Ok(())
    }

    pub fn case_insensitive(&self) -> bool {
        self.config.ignore_if_same_lowercase_names
    }
}

/// Bounded queues between the pipeline stages. Producers block when full;
/// consumers unblock when the last sender is dropped.
pub struct PipelineChannels {
    pub semi_tx: Sender<SyncTriplet>,
    pub semi_rx: Receiver<SyncTriplet>,
    pub full_tx: Sender<SyncTriplet>,
    pub full_rx: Receiver<SyncTriplet>,
}

pub fn create_pipeline_channels(capacity: usize) -> PipelineChannels {
    let (semi_tx, semi_rx) = bounded::<SyncTriplet>(capacity);
    let (full_tx, full_rx) = bounded::<SyncTriplet>(capacity);
    PipelineChannels {
        semi_tx,
        semi_rx,
        full_tx,
        full_rx,
    }
}
