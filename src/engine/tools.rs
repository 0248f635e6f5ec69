//! Path and filter utilities

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Convert absolute path to relative path from base
pub fn path_relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    path.strip_prefix(base).ok().map(|p| p.to_path_buf())
}

/// Check if a file should be excluded based on OS-specific hidden files
pub fn is_os_hidden_file(name: &str) -> bool {
    match name {
        // macOS
        ".DS_Store" | ".AppleDouble" | ".LSOverride" => true,
        // Windows
        "Thumbs.db" | "ehthumbs.db" | "Desktop.ini" | "$RECYCLE.BIN" => true,
        // Linux
        ".directory" => true,
        _ => {
            // macOS resource fork files start with ._
            name.starts_with("._")
        }
    }
}

/// True for editor/office scratch names that must never sync.
pub fn is_temp_file(name: &str) -> bool {
    name.starts_with("~$")
        || name.ends_with('~')
        || name.ends_with(".tmp")
        || name.ends_with(".swp")
        || name.ends_with(".part")
        || name.ends_with(".crdownload")
}

/// Returns true when an entry name is excluded from sync on either side.
/// The sync database (and its WAL sidecars) never syncs.
pub fn is_ignored_name(name: &str) -> bool {
    name.is_empty()
        || name.starts_with(concat!(".", env!("CARGO_PKG_NAME")))
        || is_os_hidden_file(name)
        || is_temp_file(name)
}

pub fn check_and_canonicalize(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("canonicalize path {}", path.display()))
}

/// Setup Ctrl+C handler and return a shared boolean indicating if the user has requested cancellation.
pub fn setup_ctrlc_handler() -> Result<Arc<AtomicBool>> {
    let cancel_requested = Arc::new(AtomicBool::new(false));
    let cancel_requested_handler = Arc::clone(&cancel_requested);

    ctrlc::set_handler(move || {
        cancel_requested_handler.store(true, Ordering::Relaxed);
    })
    .context("set Ctrl+C handler")?;
    Ok(cancel_requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_names() {
        assert!(is_ignored_name(".DS_Store"));
        assert!(is_ignored_name("~$report.docx"));
        assert!(is_ignored_name("draft.txt.swp"));
        assert!(is_ignored_name("notes.tmp"));
        assert!(!is_ignored_name("report.docx"));
        assert!(!is_ignored_name("tmp"));
    }
}
