//! Directory-backed session: a plain local directory standing in for the
//! repository. Object ids are `/`-separated paths relative to the backing
//! root (the legacy id shape), and there is no change log, so every sync
//! against it runs the full crawl path.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::engine::hashing::hash_file;
use crate::types::to_slash;

use super::{
    ChangeBatch, CmisSession, RemoteError, RemoteObject, RemoteResult,
};

pub struct FsSession {
    root: PathBuf,
}

impl FsSession {
    pub fn new(root: &Path) -> RemoteResult<FsSession> {
        let root = root
            .canonicalize()
            .map_err(|e| RemoteError::Other(format!("open backing directory: {e}")))?;
        Ok(FsSession { root })
    }

    fn abs(&self, id: &str) -> PathBuf {
        self.root.join(id.trim_start_matches('/'))
    }

    fn id_of_path(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn object_at(&self, id: &str) -> RemoteResult<RemoteObject> {
        let abs = self.abs(id);
        let meta = match fs::metadata(&abs) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RemoteError::NotFound(id.to_string()));
            }
            Err(e) => return Err(RemoteError::Other(format!("stat {id}: {e}"))),
        };
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        let checksum = if meta.is_file() {
            hash_file(&abs, meta.len())
                .map_err(|e| RemoteError::Other(format!("hash {id}: {e}")))?
                .map(|h| h.to_vec())
        } else {
            None
        };
        Ok(RemoteObject {
            id: id.to_string(),
            path: if id.is_empty() {
                "/".to_string()
            } else {
                format!("/{id}")
            },
            is_folder: meta.is_dir(),
            size: if meta.is_file() { meta.len() } else { 0 },
            mtime_ns,
            checksum,
        })
    }
}

impl CmisSession for FsSession {
    fn change_log_token(&self) -> RemoteResult<String> {
        Err(RemoteError::ChangeLogUnsupported(
            "directory-backed session has no change log".to_string(),
        ))
    }

    fn content_changes(
        &self,
        _token: &str,
        _include_properties: bool,
        _max_items: usize,
    ) -> RemoteResult<ChangeBatch> {
        Err(RemoteError::ChangeLogUnsupported(
            "directory-backed session has no change log".to_string(),
        ))
    }

    fn object_by_id(&self, id: &str) -> RemoteResult<RemoteObject> {
        self.object_at(id)
    }

    fn object_by_path(&self, path: &str) -> RemoteResult<RemoteObject> {
        self.object_at(&Self::id_of_path(path))
    }

    fn children(&self, folder_id: &str) -> RemoteResult<Vec<RemoteObject>> {
        let abs = self.abs(folder_id);
        let rd = match fs::read_dir(&abs) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RemoteError::NotFound(folder_id.to_string()));
            }
            Err(e) => return Err(RemoteError::Other(format!("list {folder_id}: {e}"))),
        };
        let mut names: Vec<String> = Vec::new();
        for entry in rd {
            let entry = entry.map_err(|e| RemoteError::Other(format!("list {folder_id}: {e}")))?;
            names.push(to_slash(Path::new(&entry.file_name())));
        }
        // Stable listing order so crawls are reproducible.
        names.sort();
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let child_id = if folder_id.is_empty() {
                name
            } else {
                format!("{folder_id}/{name}")
            };
            out.push(self.object_at(&child_id)?);
        }
        Ok(out)
    }

    fn create_folder(&self, parent_path: &str, name: &str) -> RemoteResult<RemoteObject> {
        let parent_id = Self::id_of_path(parent_path);
        let id = if parent_id.is_empty() {
            name.to_string()
        } else {
            format!("{parent_id}/{name}")
        };
        match fs::create_dir(self.abs(&id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(RemoteError::Other(format!("create folder {id}: {e}"))),
        }
        self.object_at(&id)
    }

    fn create_document(
        &self,
        parent_path: &str,
        name: &str,
        content: &[u8],
    ) -> RemoteResult<RemoteObject> {
        let parent_id = Self::id_of_path(parent_path);
        let id = if parent_id.is_empty() {
            name.to_string()
        } else {
            format!("{parent_id}/{name}")
        };
        fs::write(self.abs(&id), content)
            .map_err(|e| RemoteError::Other(format!("create document {id}: {e}")))?;
        self.object_at(&id)
    }

    fn delete_object(&self, id: &str) -> RemoteResult<()> {
        let abs = self.abs(id);
        let meta = match fs::metadata(&abs) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RemoteError::NotFound(id.to_string()));
            }
            Err(e) => return Err(RemoteError::Other(format!("stat {id}: {e}"))),
        };
        let result = if meta.is_dir() {
            // remove_dir refuses a non-empty folder, matching the protocol.
            fs::remove_dir(&abs)
        } else {
            fs::remove_file(&abs)
        };
        result.map_err(|e| RemoteError::Other(format!("delete {id}: {e}")))
    }

    fn download(&self, id: &str) -> RemoteResult<Vec<u8>> {
        match fs::read(self.abs(id)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(RemoteError::NotFound(id.to_string()))
            }
            Err(e) => Err(RemoteError::Other(format!("download {id}: {e}"))),
        }
    }

    fn upload(&self, id: &str, content: &[u8]) -> RemoteResult<RemoteObject> {
        let abs = self.abs(id);
        if !abs.exists() {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        fs::write(&abs, content)
            .map_err(|e| RemoteError::Other(format!("upload {id}: {e}")))?;
        self.object_at(id)
    }
}
