//! Remote repository seam: the session trait the pipeline talks to, the wire
//! types it exchanges, and the typed errors the pipeline branches on.

pub mod fs_session;

pub use fs_session::FsSession;

use thiserror::Error;

/// Result type for session operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors surfaced by a [`CmisSession`] implementation.
///
/// The pipeline branches on these: not-found is a normal deletion signal
/// during change-log processing, timeouts and transient failures are retried,
/// an unsupported change log escalates to a full crawl.
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    /// The addressed object does not exist on the server.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The call exceeded its deadline.
    #[error("call timed out: {0}")]
    Timeout(String),

    /// A transport failure worth retrying (connection reset, throttling).
    #[error("transient transport failure: {0}")]
    Transient(String),

    /// The server cannot serve a usable change log.
    #[error("change log unsupported: {0}")]
    ChangeLogUnsupported(String),

    /// Anything else; not retried.
    #[error("remote failure: {0}")]
    Other(String),
}

impl RemoteError {
    /// True for failures the processor may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Timeout(_) | RemoteError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

/// Kind of a change-log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
    Security,
}

/// One event from the server change feed.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub object_id: String,
    pub change_type: ChangeType,
    /// Server timestamp in 100 ns file-time units; some servers omit it.
    pub timestamp_ticks: Option<i64>,
}

/// One page of the change feed.
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    pub events: Vec<ChangeEvent>,
    pub latest_token: Option<String>,
    pub has_more: bool,
}

/// An object as the server describes it.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    pub id: String,
    /// Absolute repository path, `/`-separated.
    pub path: String,
    pub is_folder: bool,
    pub size: u64,
    pub mtime_ns: i64,
    pub checksum: Option<Vec<u8>>,
}

/// Session onto a CMIS-like repository: folders and documents addressed by
/// stable ids and hierarchical paths, plus a change-log token stream.
///
/// Implementations own all transport state and deadlines; a call that
/// exceeds its deadline returns [`RemoteError::Timeout`].
pub trait CmisSession: Send + Sync {
    /// Current server change-log token.
    fn change_log_token(&self) -> RemoteResult<String>;

    /// Change events after `token`, at most `max_items` per page.
    fn content_changes(
        &self,
        token: &str,
        include_properties: bool,
        max_items: usize,
    ) -> RemoteResult<ChangeBatch>;

    fn object_by_id(&self, id: &str) -> RemoteResult<RemoteObject>;

    fn object_by_path(&self, path: &str) -> RemoteResult<RemoteObject>;

    /// Direct children of a folder.
    fn children(&self, folder_id: &str) -> RemoteResult<Vec<RemoteObject>>;

    /// Create a folder under `parent_path`. Returns the existing object when
    /// the name is already taken by a folder.
    fn create_folder(&self, parent_path: &str, name: &str) -> RemoteResult<RemoteObject>;

    fn create_document(
        &self,
        parent_path: &str,
        name: &str,
        content: &[u8],
    ) -> RemoteResult<RemoteObject>;

    /// Delete one object. Deleting a non-empty folder is an error; the
    /// dependency graph orders contents first.
    fn delete_object(&self, id: &str) -> RemoteResult<()>;

    fn download(&self, id: &str) -> RemoteResult<Vec<u8>>;

    /// Replace a document's content. Returns the refreshed object.
    fn upload(&self, id: &str, content: &[u8]) -> RemoteResult<RemoteObject>;
}

/// Strip a legacy path prefix from an object id: some servers embed the
/// repository path before the id, keep only the trailing segment.
pub fn strip_id_path_prefix(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}
