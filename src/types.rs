//! Public and internal types for the trisync API and pipeline.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::engine::hashing::hash_file;

/// View of an item as it exists on the local filesystem.
///
/// The content hash is computed lazily via [`LocalView::content_hash`] and
/// cached; folders never carry a hash.
#[derive(Clone, Debug)]
pub struct LocalView {
    /// Absolute path on disk.
    pub abs_path: PathBuf,
    /// Path relative to the sync root, `/`-separated, no trailing separator.
    pub rel_path: String,
    pub size: u64,
    /// Modification time in nanoseconds since epoch.
    pub mtime_ns: i64,
    pub is_folder: bool,
    hash: Option<[u8; 32]>,
}

impl LocalView {
    /// Build a view from disk metadata. Returns `None` when the path does not
    /// exist (the item has no local presence).
    pub fn from_disk(root: &Path, rel_path: &str) -> Option<LocalView> {
        let abs_path = root.join(rel_path);
        let meta = std::fs::metadata(&abs_path).ok()?;
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Some(LocalView {
            abs_path,
            rel_path: rel_path.to_string(),
            size: meta.len(),
            mtime_ns,
            is_folder: meta.is_dir(),
            hash: None,
        })
    }

    /// Blake3 hash of the file content, computed on first use.
    pub fn content_hash(&mut self) -> Result<Option<[u8; 32]>> {
        if self.is_folder {
            return Ok(None);
        }
        if self.hash.is_none() {
            self.hash = hash_file(&self.abs_path, self.size)?;
        }
        Ok(self.hash)
    }
}

/// Row recorded for an item by the previous sync run.
#[derive(Clone, Debug, PartialEq)]
pub struct DbView {
    pub local_rel_path: String,
    pub remote_id: String,
    pub remote_rel_path: String,
    pub checksum: Option<Vec<u8>>,
    pub local_mtime_ns: i64,
    pub remote_mtime_ns: i64,
    pub is_folder: bool,
}

/// View of an item as the server reports it.
#[derive(Clone, Debug)]
pub struct RemoteView {
    pub id: String,
    /// Path relative to the remote sync root, `/`-separated.
    pub rel_path: String,
    pub checksum: Option<Vec<u8>>,
    pub mtime_ns: i64,
    pub is_folder: bool,
}

/// The three-way join of local, database, and remote views of one item.
///
/// At least one view is always present. A triplet is created by a crawler or
/// the change-log ingester with its own side(s) populated, completed by the
/// assembler, and consumed exactly once by the processor.
#[derive(Clone, Debug)]
pub struct SyncTriplet {
    /// Canonical name: path relative to the sync root, `/`-separated, with a
    /// trailing separator for folders.
    pub name: String,
    pub is_folder: bool,
    pub local: Option<LocalView>,
    pub db: Option<DbView>,
    pub remote: Option<RemoteView>,
    /// Set by the assembler for a local entry whose lookup key collides with
    /// an already-emitted one under a case-insensitive server.
    pub local_duplicate: bool,
    /// Transport retries spent on this triplet so far.
    pub retries: u32,
}

impl SyncTriplet {
    pub fn new(name: String, is_folder: bool) -> SyncTriplet {
        SyncTriplet {
            name,
            is_folder,
            local: None,
            db: None,
            remote: None,
            local_duplicate: false,
            retries: 0,
        }
    }

    pub fn with_local(mut self, local: LocalView) -> SyncTriplet {
        self.local = Some(local);
        self
    }

    pub fn with_db(mut self, db: DbView) -> SyncTriplet {
        self.db = Some(db);
        self
    }

    pub fn with_remote(mut self, remote: RemoteView) -> SyncTriplet {
        self.remote = Some(remote);
        self
    }

    /// A triplet with no view at all must never enter the pipeline.
    pub fn is_valid(&self) -> bool {
        self.local.is_some() || self.db.is_some() || self.remote.is_some()
    }
}

/// Normalize a path for canonical names and DB storage: forward slashes only.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Canonical name of an item: `/`-separated relative path, folders suffixed
/// with the separator.
pub fn canonical_name(rel_path: &str, is_folder: bool) -> String {
    let trimmed = rel_path.trim_end_matches('/');
    if is_folder {
        format!("{trimmed}/")
    } else {
        trimmed.to_string()
    }
}

/// Key used for joining the local and remote sides: the canonical name,
/// lowercased when the server is known to be case-insensitive.
pub fn lookup_key(name: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        name.to_lowercase()
    } else {
        name.to_string()
    }
}

/// Canonical name of the parent folder, or `None` for top-level items.
pub fn parent_name(name: &str) -> Option<String> {
    let trimmed = name.trim_end_matches('/');
    trimmed.rfind('/').map(|i| format!("{}/", &trimmed[..i]))
}

/// Canonical name with the trailing folder separator removed.
pub fn rel_of_name(name: &str) -> &str {
    name.trim_end_matches('/')
}

/// Relative position of a remote path under the remote sync root, or `None`
/// when the path does not fall under the root.
pub fn remote_rel(path: &str, remote_root: &str) -> Option<String> {
    let root = remote_root.trim_end_matches('/');
    if root.is_empty() {
        return Some(path.trim_start_matches('/').to_string());
    }
    if path == root {
        return Some(String::new());
    }
    path.strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|rest| rest.to_string())
}

/// Absolute remote path of an item relative to the remote sync root.
pub fn remote_abs(remote_root: &str, rel_path: &str) -> String {
    let root = remote_root.trim_end_matches('/');
    if rel_path.is_empty() {
        if root.is_empty() {
            "/".to_string()
        } else {
            root.to_string()
        }
    } else {
        format!("{root}/{rel_path}")
    }
}

/// Keep-both name for a conflicting relative path:
/// `a/b.txt` becomes `a/b (conflict <ts>).txt`.
pub fn conflict_rel_path(rel_path: &str, unix_secs: u64) -> String {
    let (dir, file) = match rel_path.rfind('/') {
        Some(i) => (&rel_path[..=i], &rel_path[i + 1..]),
        None => ("", rel_path),
    };
    // Split on the last dot, ignoring a leading one (dotfiles keep their name).
    let (stem, ext) = match file.rfind('.') {
        Some(i) if i > 0 => (&file[..i], &file[i..]),
        _ => (file, ""),
    };
    format!("{dir}{stem} (conflict {unix_secs}){ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names() {
        assert_eq!(canonical_name("a/b", true), "a/b/");
        assert_eq!(canonical_name("a/b/", true), "a/b/");
        assert_eq!(canonical_name("a/b.txt", false), "a/b.txt");
    }

    #[test]
    fn parent_names() {
        assert_eq!(parent_name("a/b/c.txt").as_deref(), Some("a/b/"));
        assert_eq!(parent_name("a/b/").as_deref(), Some("a/"));
        assert_eq!(parent_name("top.txt"), None);
        assert_eq!(parent_name("top/"), None);
    }

    #[test]
    fn remote_rel_under_root() {
        assert_eq!(remote_rel("/a/b.txt", "/").as_deref(), Some("a/b.txt"));
        assert_eq!(remote_rel("/sync/a", "/sync").as_deref(), Some("a"));
        assert_eq!(remote_rel("/sync", "/sync").as_deref(), Some(""));
        assert_eq!(remote_rel("/other/a", "/sync"), None);
        assert_eq!(remote_rel("/synced/a", "/sync"), None);
    }

    #[test]
    fn conflict_names() {
        assert_eq!(conflict_rel_path("a/b.txt", 7), "a/b (conflict 7).txt");
        assert_eq!(conflict_rel_path("plain", 7), "plain (conflict 7)");
        assert_eq!(conflict_rel_path(".hidden", 7), ".hidden (conflict 7)");
    }
}
