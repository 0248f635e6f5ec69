//! Shared test fixtures: a scripted in-memory repository session.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use trisync::engine::hashing::hash_bytes;
use trisync::remote::{
    ChangeBatch, ChangeEvent, ChangeType, CmisSession, RemoteError, RemoteObject, RemoteResult,
};

struct MemEntry {
    id: String,
    is_folder: bool,
    content: Vec<u8>,
    mtime_ns: i64,
}

#[derive(Default)]
struct MemState {
    /// Path relative to the repository root ("" = root) to entry, sorted so
    /// listings are stable.
    entries: BTreeMap<String, MemEntry>,
    server_token: String,
    /// Scripted change-feed pages, drained front-first.
    pages: Vec<ChangeBatch>,
    /// Next N download calls fail with a transient error.
    download_failures: u32,
    /// Next N delete calls fail outright.
    delete_failures: u32,
    next_id: u64,
    clock: i64,
}

/// In-memory repository with a scriptable change feed. Object ids are opaque
/// (`obj-N`) and stable for the life of the entry.
pub struct MemorySession {
    state: Mutex<MemState>,
}

impl MemorySession {
    pub fn new() -> MemorySession {
        let mut state = MemState::default();
        state.entries.insert(
            String::new(),
            MemEntry {
                id: "obj-0".to_string(),
                is_folder: true,
                content: Vec::new(),
                mtime_ns: 0,
            },
        );
        state.next_id = 1;
        MemorySession {
            state: Mutex::new(state),
        }
    }

    pub fn set_token(&self, token: &str) {
        self.state.lock().unwrap().server_token = token.to_string();
    }

    /// Queue one change-feed page; pages are served in push order.
    pub fn push_page(&self, page: ChangeBatch) {
        self.state.lock().unwrap().pages.push(page);
    }

    pub fn seed_folder(&self, path: &str) -> String {
        let mut state = self.state.lock().unwrap();
        allocate(&mut state, path, true, Vec::new())
    }

    pub fn seed_doc(&self, path: &str, content: &[u8]) -> String {
        let mut state = self.state.lock().unwrap();
        allocate(&mut state, path, false, content.to_vec())
    }

    pub fn remove_entry(&self, path: &str) {
        self.state.lock().unwrap().entries.remove(path);
    }

    pub fn id_of(&self, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(path)
            .map(|e| e.id.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().unwrap().entries.contains_key(path)
    }

    pub fn content_of(&self, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(path)
            .map(|e| e.content.clone())
    }

    /// Make the next `n` download calls fail with a transient error.
    pub fn fail_downloads(&self, n: u32) {
        self.state.lock().unwrap().download_failures = n;
    }

    /// Make the next `n` delete calls fail outright (not retryable).
    pub fn fail_deletes(&self, n: u32) {
        self.state.lock().unwrap().delete_failures = n;
    }

    /// All non-root paths currently present, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .entries
            .keys()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect()
    }
}

fn allocate(state: &mut MemState, path: &str, is_folder: bool, content: Vec<u8>) -> String {
    let id = format!("obj-{}", state.next_id);
    state.next_id += 1;
    state.clock += 1;
    let mtime_ns = state.clock * 1_000_000;
    state.entries.insert(
        path.to_string(),
        MemEntry {
            id: id.clone(),
            is_folder,
            content,
            mtime_ns,
        },
    );
    id
}

fn object_for(path: &str, entry: &MemEntry) -> RemoteObject {
    RemoteObject {
        id: entry.id.clone(),
        path: if path.is_empty() {
            "/".to_string()
        } else {
            format!("/{path}")
        },
        is_folder: entry.is_folder,
        size: entry.content.len() as u64,
        mtime_ns: entry.mtime_ns,
        checksum: if entry.is_folder {
            None
        } else {
            Some(hash_bytes(&entry.content).to_vec())
        },
    }
}

fn parent_of(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

impl CmisSession for MemorySession {
    fn change_log_token(&self) -> RemoteResult<String> {
        Ok(self.state.lock().unwrap().server_token.clone())
    }

    fn content_changes(
        &self,
        _token: &str,
        _include_properties: bool,
        _max_items: usize,
    ) -> RemoteResult<ChangeBatch> {
        let mut state = self.state.lock().unwrap();
        if state.pages.is_empty() {
            return Ok(ChangeBatch {
                events: Vec::new(),
                latest_token: Some(state.server_token.clone()),
                has_more: false,
            });
        }
        Ok(state.pages.remove(0))
    }

    fn object_by_id(&self, id: &str) -> RemoteResult<RemoteObject> {
        let state = self.state.lock().unwrap();
        state
            .entries
            .iter()
            .find(|(_, e)| e.id == id)
            .map(|(path, e)| object_for(path, e))
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    fn object_by_path(&self, path: &str) -> RemoteResult<RemoteObject> {
        let key = path.trim_matches('/');
        let state = self.state.lock().unwrap();
        state
            .entries
            .get(key)
            .map(|e| object_for(key, e))
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }

    fn children(&self, folder_id: &str) -> RemoteResult<Vec<RemoteObject>> {
        let state = self.state.lock().unwrap();
        let Some((folder_path, folder)) = state.entries.iter().find(|(_, e)| e.id == folder_id)
        else {
            return Err(RemoteError::NotFound(folder_id.to_string()));
        };
        if !folder.is_folder {
            return Err(RemoteError::Other(format!("{folder_id} is not a folder")));
        }
        let folder_path = folder_path.clone();
        Ok(state
            .entries
            .iter()
            .filter(|(path, _)| !path.is_empty() && parent_of(path) == folder_path)
            .map(|(path, e)| object_for(path, e))
            .collect())
    }

    fn create_folder(&self, parent_path: &str, name: &str) -> RemoteResult<RemoteObject> {
        let parent = parent_path.trim_matches('/');
        let path = if parent.is_empty() {
            name.to_string()
        } else {
            format!("{parent}/{name}")
        };
        let mut state = self.state.lock().unwrap();
        if !state.entries.contains_key(parent) {
            return Err(RemoteError::NotFound(parent_path.to_string()));
        }
        if state.entries.get(&path).is_none() {
            allocate(&mut state, &path, true, Vec::new());
        }
        Ok(object_for(&path, state.entries.get(&path).unwrap()))
    }

    fn create_document(
        &self,
        parent_path: &str,
        name: &str,
        content: &[u8],
    ) -> RemoteResult<RemoteObject> {
        let parent = parent_path.trim_matches('/');
        let path = if parent.is_empty() {
            name.to_string()
        } else {
            format!("{parent}/{name}")
        };
        let mut state = self.state.lock().unwrap();
        if !state.entries.contains_key(parent) {
            return Err(RemoteError::NotFound(parent_path.to_string()));
        }
        allocate(&mut state, &path, false, content.to_vec());
        Ok(object_for(&path, state.entries.get(&path).unwrap()))
    }

    fn delete_object(&self, id: &str) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.delete_failures > 0 {
            state.delete_failures -= 1;
            return Err(RemoteError::Other("injected delete failure".to_string()));
        }
        let Some((path, entry)) = state.entries.iter().find(|(_, e)| e.id == id) else {
            return Err(RemoteError::NotFound(id.to_string()));
        };
        let path = path.clone();
        if entry.is_folder {
            let has_children = state
                .entries
                .keys()
                .any(|p| !p.is_empty() && parent_of(p) == path);
            if has_children {
                return Err(RemoteError::Other(format!("folder {path} not empty")));
            }
        }
        state.entries.remove(&path);
        Ok(())
    }

    fn download(&self, id: &str) -> RemoteResult<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        if state.download_failures > 0 {
            state.download_failures -= 1;
            return Err(RemoteError::Transient("injected download failure".to_string()));
        }
        state
            .entries
            .values()
            .find(|e| e.id == id)
            .map(|e| e.content.clone())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    fn upload(&self, id: &str, content: &[u8]) -> RemoteResult<RemoteObject> {
        let mut state = self.state.lock().unwrap();
        state.clock += 1;
        let mtime_ns = state.clock * 1_000_000;
        let Some((path, entry)) = state.entries.iter_mut().find(|(_, e)| e.id == id) else {
            return Err(RemoteError::NotFound(id.to_string()));
        };
        entry.content = content.to_vec();
        entry.mtime_ns = mtime_ns;
        let path = path.clone();
        Ok(object_for(&path, state.entries.get(&path).unwrap()))
    }
}

/// Shorthand for building a change event.
pub fn event(object_id: &str, change_type: ChangeType, timestamp_ticks: Option<i64>) -> ChangeEvent {
    ChangeEvent {
        object_id: object_id.to_string(),
        change_type,
        timestamp_ticks,
    }
}

/// Final page of a scripted feed.
pub fn last_page(events: Vec<ChangeEvent>, token: &str) -> ChangeBatch {
    ChangeBatch {
        events,
        latest_token: Some(token.to_string()),
        has_more: false,
    }
}

/// Non-final page of a scripted feed.
pub fn more_page(events: Vec<ChangeEvent>, token: Option<&str>) -> ChangeBatch {
    ChangeBatch {
        events,
        latest_token: token.map(|t| t.to_string()),
        has_more: true,
    }
}
