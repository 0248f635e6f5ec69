//! Sync configuration and tuning constants.
//! Thresholds in one place; the per-run record is frozen and injected.

use std::time::Duration;

/// Policy for the server quirk of repeating the last-seen event as the first
/// element of the next change-log page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DropFirstEvent {
    /// Drop the first event of every page, including the first one.
    #[default]
    Always,
    /// Keep the first page intact; drop only on follow-up pages.
    NonFirstOnly,
}

/// Frozen per-run configuration. Built once by the caller and handed to each
/// component; components never reach for process-wide state.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Page size for change-log requests.
    pub max_changes_per_page: usize,
    /// The server reports names case-insensitively; join on lowercased keys.
    pub ignore_if_same_lowercase_names: bool,
    /// Interval between sync passes when polling.
    pub poll_interval: Duration,
    /// Run a sync pass immediately on startup before the first poll tick.
    pub sync_at_startup: bool,
    /// Window for collapsing repeated update events, in 100 ns file-time
    /// units (500 ms).
    pub coalesce_window_ticks: i64,
    pub drop_first_event: DropFirstEvent,
    /// Processor worker pool width.
    pub worker_threads: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            max_changes_per_page: 50,
            ignore_if_same_lowercase_names: false,
            poll_interval: Duration::from_secs(30),
            sync_at_startup: true,
            coalesce_window_ticks: COALESCE_WINDOW_TICKS,
            drop_first_event: DropFirstEvent::Always,
            worker_threads: rayon::current_num_threads(),
        }
    }
}

impl SyncConfig {
    /// Capacity of the semi- and full-triplet queues.
    pub fn channel_capacity(&self) -> usize {
        self.worker_threads.max(1) * QueueConsts::CHANNEL_FACTOR
    }
}

/// Coalescing window for same-object update events: 500 ms in 100 ns units.
pub const COALESCE_WINDOW_TICKS: i64 = 5_000_000;

// ---- Queues ----

/// Queue sizing and deferral polling.
pub struct QueueConsts;

impl QueueConsts {
    /// Queue capacity per worker (capacity = workers x factor).
    pub const CHANNEL_FACTOR: usize = 4;
    /// Receive timeout while deferred triplets may still become ready (ms).
    pub const DEFER_POLL_MS: u64 = 25;
}

// ---- Transport retries ----

/// Retry policy for transient transport failures.
pub struct RetryConsts;

impl RetryConsts {
    /// Transient failures are retried this many times before the triplet
    /// fails.
    pub const MAX_TRANSPORT_RETRIES: u32 = 3;
    /// A timed-out call is retried once, then fails.
    pub const MAX_TIMEOUT_RETRIES: u32 = 1;
    /// Base backoff before a retry; doubles per attempt.
    pub const BASE_BACKOFF_MS: u64 = 250;
}

// ---- Hashing ----

/// Hashing I/O thresholds and buffer sizes.
pub struct HashingConsts;

impl HashingConsts {
    /// File size above which hashing uses memory-mapped I/O (bytes). 100 MB.
    pub const HASH_MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;
    /// Chunk size for reading files below mmap threshold (bytes). 1 MB.
    pub const HASH_READ_CHUNK_SIZE: usize = 1024 * 1024;
}
