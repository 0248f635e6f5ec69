//! End-to-end sync passes against the in-memory repository: creations in
//! both directions, ordered deletions, conflicts, escalation, and the
//! case-insensitive join.

mod common;

use common::{MemorySession, event, last_page};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tempfile::TempDir;

use trisync::engine::db_ops::SyncDatabase;
use trisync::engine::hashing::hash_bytes;
use trisync::remote::ChangeType;
use trisync::types::DbView;
use trisync::utils::SyncConfig;
use trisync::{SyncReport, sync_once};

fn run(
    session: &Arc<MemorySession>,
    db: &Arc<SyncDatabase>,
    root: &Path,
    config: &SyncConfig,
) -> SyncReport {
    sync_once(
        session.clone(),
        db.clone(),
        root,
        "/",
        config,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap()
}

fn seed_row(db: &SyncDatabase, local: &str, remote_id: &str, checksum: Option<Vec<u8>>, is_folder: bool) {
    db.record_upload(&DbView {
        local_rel_path: local.to_string(),
        remote_id: remote_id.to_string(),
        remote_rel_path: local.to_string(),
        checksum,
        local_mtime_ns: 0,
        remote_mtime_ns: 0,
        is_folder,
    })
    .unwrap();
}

/// Empty local tree, one new remote document announced by the change log:
/// the file lands locally, the row is written, the token advances.
#[test]
fn clean_remote_only_create() {
    let tmp = TempDir::new().unwrap();
    let session = Arc::new(MemorySession::new());
    session.set_token("T1");
    session.seed_folder("a");
    let id_b = session.seed_doc("a/b.txt", b"0123456789");
    session.push_page(last_page(
        vec![
            event("dup-of-last-run", ChangeType::Created, None),
            event(&id_b, ChangeType::Created, None),
        ],
        "T1",
    ));

    let db = Arc::new(SyncDatabase::open_in_memory().unwrap());
    db.set_change_log_token("T0").unwrap();

    let report = run(&session, &db, tmp.path(), &SyncConfig::default());

    assert_eq!(report.downloaded, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(fs::read(tmp.path().join("a/b.txt")).unwrap(), b"0123456789");
    let row = db.row_by_local_path("a/b.txt").unwrap().unwrap();
    assert_eq!(row.remote_id, id_b);
    assert_eq!(row.checksum, Some(hash_bytes(b"0123456789").to_vec()));
    assert_eq!(db.change_log_token().unwrap().as_deref(), Some("T1"));
}

/// Empty server and database, one new local file: folder and document are
/// created remotely, rows are written, the token advances.
#[test]
fn local_only_create() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("a")).unwrap();
    fs::write(tmp.path().join("a/b.txt"), b"local bytes").unwrap();

    let session = Arc::new(MemorySession::new());
    session.set_token("T9");
    let db = Arc::new(SyncDatabase::open_in_memory().unwrap());

    let report = run(&session, &db, tmp.path(), &SyncConfig::default());

    assert_eq!(report.uploaded, 2);
    assert_eq!(report.failed, 0);
    assert!(session.contains("a"));
    assert_eq!(session.content_of("a/b.txt").unwrap(), b"local bytes");
    assert!(db.row_by_local_path("a").unwrap().unwrap().is_folder);
    let row = db.row_by_local_path("a/b.txt").unwrap().unwrap();
    assert_eq!(row.checksum, Some(hash_bytes(b"local bytes").to_vec()));
    assert_eq!(db.change_log_token().unwrap().as_deref(), Some("T9"));
}

/// Server deleted a folder and its two files; events arrive in one page in
/// folder-first order. Contents must go before the folder, and the run ends
/// with the graph drained.
#[test]
fn remote_delete_of_populated_folder() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("x")).unwrap();
    fs::write(tmp.path().join("x/y.txt"), b"y").unwrap();
    fs::write(tmp.path().join("x/z.txt"), b"z").unwrap();

    let session = Arc::new(MemorySession::new());
    session.set_token("T1");
    session.push_page(last_page(
        vec![
            event("dup-of-last-run", ChangeType::Created, None),
            event("fx", ChangeType::Deleted, None),
            event("fy", ChangeType::Deleted, None),
            event("fz", ChangeType::Deleted, None),
        ],
        "T1",
    ));

    let db = Arc::new(SyncDatabase::open_in_memory().unwrap());
    db.set_change_log_token("T0").unwrap();
    seed_row(&db, "x", "fx", None, true);
    seed_row(&db, "x/y.txt", "fy", None, false);
    seed_row(&db, "x/z.txt", "fz", None, false);

    let report = run(&session, &db, tmp.path(), &SyncConfig::default());

    assert_eq!(report.deleted, 3);
    assert_eq!(report.failed, 0);
    assert!(!tmp.path().join("x").exists());
    assert!(db.all_local_paths().unwrap().is_empty());
    assert_eq!(db.change_log_token().unwrap().as_deref(), Some("T1"));
}

/// Both sides changed the same document: the local copy is kept under a
/// conflict name (and uploaded), the server content takes the original name,
/// and no data is lost.
#[test]
fn conflicting_edit_keeps_both() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("a")).unwrap();
    fs::write(tmp.path().join("a/b.txt"), b"local edit").unwrap();

    let session = Arc::new(MemorySession::new());
    session.set_token("T3");
    session.seed_folder("a");
    let id_b = session.seed_doc("a/b.txt", b"remote edit");

    let db = Arc::new(SyncDatabase::open_in_memory().unwrap());
    seed_row(
        &db,
        "a/b.txt",
        &id_b,
        Some(hash_bytes(b"the old shared content").to_vec()),
        false,
    );

    let report = run(&session, &db, tmp.path(), &SyncConfig::default());

    assert_eq!(report.conflicts, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(fs::read(tmp.path().join("a/b.txt")).unwrap(), b"remote edit");

    let conflict_names: Vec<String> = fs::read_dir(tmp.path().join("a"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|n| n.starts_with("b (conflict"))
        .collect();
    assert_eq!(conflict_names.len(), 1, "exactly one conflict copy");
    let conflict_rel = format!("a/{}", conflict_names[0]);
    assert_eq!(
        fs::read(tmp.path().join(&conflict_rel)).unwrap(),
        b"local edit"
    );
    // Both files are on the server and in the database.
    assert_eq!(session.content_of(&conflict_rel).unwrap(), b"local edit");
    assert!(db.row_by_local_path("a/b.txt").unwrap().is_some());
    assert!(db.row_by_local_path(&conflict_rel).unwrap().is_some());
}

/// An update event makes the incremental path bail out; the full crawl picks
/// up the run and only then does the token advance.
#[test]
fn update_during_changelog_escalates_to_full_sync() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("f.txt"), b"same everywhere").unwrap();

    let session = Arc::new(MemorySession::new());
    session.set_token("T1");
    let id_f = session.seed_doc("f.txt", b"same everywhere");
    session.push_page(last_page(
        vec![
            event("dup-of-last-run", ChangeType::Created, None),
            event(&id_f, ChangeType::Updated, None),
        ],
        "T1",
    ));

    let db = Arc::new(SyncDatabase::open_in_memory().unwrap());
    db.set_change_log_token("T0").unwrap();
    seed_row(
        &db,
        "f.txt",
        &id_f,
        Some(hash_bytes(b"same everywhere").to_vec()),
        false,
    );

    let report = run(&session, &db, tmp.path(), &SyncConfig::default());

    // The crawl found both sides unchanged; nothing was transferred.
    assert_eq!(report.downloaded, 0);
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.refreshed, 1);
    assert_eq!(db.change_log_token().unwrap().as_deref(), Some("T1"));
}

/// Case-insensitive server: two local names colliding on the lookup key.
/// The server's file joins once; the surplus local entry is renamed to a
/// conflict copy and kept.
#[test]
fn case_insensitive_local_collision() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("Foo.txt"), b"shared").unwrap();
    fs::write(tmp.path().join("foo.TXT"), b"the other one").unwrap();

    let session = Arc::new(MemorySession::new());
    session.set_token("T4");
    session.seed_doc("Foo.txt", b"shared");

    let db = Arc::new(SyncDatabase::open_in_memory().unwrap());
    let config = SyncConfig {
        ignore_if_same_lowercase_names: true,
        ..Default::default()
    };

    let report = run(&session, &db, tmp.path(), &config);

    assert_eq!(report.conflicts, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(fs::read(tmp.path().join("Foo.txt")).unwrap(), b"shared");
    assert!(!tmp.path().join("foo.TXT").exists());

    let conflict_names: Vec<String> = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|n| n.starts_with("foo (conflict"))
        .collect();
    assert_eq!(conflict_names.len(), 1);
    assert_eq!(
        fs::read(tmp.path().join(&conflict_names[0])).unwrap(),
        b"the other one"
    );
    assert_eq!(
        session.content_of(&conflict_names[0]).unwrap(),
        b"the other one"
    );
}

/// Crawler-mode deletion ordering: the whole subtree vanished locally, so
/// the remote children must be deleted before their folder (the fake refuses
/// to delete a non-empty folder).
#[test]
fn local_delete_of_populated_folder() {
    let tmp = TempDir::new().unwrap();

    let session = Arc::new(MemorySession::new());
    session.set_token("T5");
    let id_x = session.seed_folder("x");
    let id_y = session.seed_doc("x/y.txt", b"y");

    let db = Arc::new(SyncDatabase::open_in_memory().unwrap());
    seed_row(&db, "x", &id_x, None, true);
    seed_row(&db, "x/y.txt", &id_y, Some(hash_bytes(b"y").to_vec()), false);

    let report = run(&session, &db, tmp.path(), &SyncConfig::default());

    assert_eq!(report.deleted, 2);
    assert_eq!(report.failed, 0);
    assert!(session.paths().is_empty());
    assert!(db.all_local_paths().unwrap().is_empty());
}

/// A remote-only subtree materializes locally, parents before children.
#[test]
fn remote_only_tree_created_locally() {
    let tmp = TempDir::new().unwrap();

    let session = Arc::new(MemorySession::new());
    session.set_token("T6");
    session.seed_folder("a");
    session.seed_folder("a/b");
    session.seed_doc("a/b/c.txt", b"deep");
    session.seed_doc("a/d.txt", b"shallow");

    let db = Arc::new(SyncDatabase::open_in_memory().unwrap());
    let report = run(&session, &db, tmp.path(), &SyncConfig::default());

    assert_eq!(report.downloaded, 4);
    assert_eq!(report.failed, 0);
    assert_eq!(fs::read(tmp.path().join("a/b/c.txt")).unwrap(), b"deep");
    assert_eq!(fs::read(tmp.path().join("a/d.txt")).unwrap(), b"shallow");
    assert_eq!(db.all_local_paths().unwrap().len(), 4);
    assert_eq!(db.change_log_token().unwrap().as_deref(), Some("T6"));
}

/// Transient transport failures are retried with backoff and do not fail
/// the triplet until the budget runs out.
#[test]
fn transient_download_failures_are_retried() {
    let tmp = TempDir::new().unwrap();

    let session = Arc::new(MemorySession::new());
    session.set_token("T7");
    session.seed_doc("r.txt", b"eventually");
    session.fail_downloads(2);

    let db = Arc::new(SyncDatabase::open_in_memory().unwrap());
    let report = run(&session, &db, tmp.path(), &SyncConfig::default());

    assert_eq!(report.downloaded, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(fs::read(tmp.path().join("r.txt")).unwrap(), b"eventually");
}

/// A triplet that exhausts its retry budget fails for that item only; the
/// run completes but the token does not advance.
#[test]
fn exhausted_retries_fail_the_triplet_and_hold_the_token() {
    let tmp = TempDir::new().unwrap();

    let session = Arc::new(MemorySession::new());
    session.set_token("T8");
    let id_x = session.seed_folder("x");
    let id_y = session.seed_doc("x/y.txt", b"y");
    // Exhaust the whole retry budget so the download finally fails.
    session.fail_downloads(16);

    let db = Arc::new(SyncDatabase::open_in_memory().unwrap());
    db.set_change_log_token("T0").unwrap();
    seed_row(&db, "x", &id_x, None, true);
    seed_row(&db, "x/y.txt", &id_y, Some(hash_bytes(b"old").to_vec()), false);

    // Local side still has the folder but the file content differs remotely,
    // forcing a download that keeps failing.
    fs::create_dir(tmp.path().join("x")).unwrap();
    fs::write(tmp.path().join("x/y.txt"), b"old").unwrap();

    session.push_page(last_page(
        vec![
            event("dup-of-last-run", ChangeType::Created, None),
            event(&id_y, ChangeType::Security, None),
        ],
        "T2",
    ));

    let report = run(&session, &db, tmp.path(), &SyncConfig::default());

    assert!(report.failed > 0);
    assert_eq!(db.change_log_token().unwrap().as_deref(), Some("T0"));
    // Nothing was deleted; the local file is untouched.
    assert!(tmp.path().join("x/y.txt").exists());
}

/// A failed child poisons its ancestors: the folder deletion is skipped,
/// nothing half-deletes, and the token does not advance.
#[test]
fn failed_child_poisons_folder_deletion() {
    let tmp = TempDir::new().unwrap();

    let session = Arc::new(MemorySession::new());
    session.set_token("T9");
    let id_x = session.seed_folder("x");
    let id_y = session.seed_doc("x/y.txt", b"y");
    session.fail_deletes(1);

    let db = Arc::new(SyncDatabase::open_in_memory().unwrap());
    seed_row(&db, "x", &id_x, None, true);
    seed_row(&db, "x/y.txt", &id_y, Some(hash_bytes(b"y").to_vec()), false);

    // Local side is empty: both rows are deletion candidates.
    let report = run(&session, &db, tmp.path(), &SyncConfig::default());

    assert_eq!(report.failed, 1, "the child delete failed");
    assert_eq!(report.skipped, 1, "the folder deletion was skipped");
    assert_eq!(report.deleted, 0);
    // Server still holds both objects; the rows survive for the next run.
    assert!(session.contains("x"));
    assert!(session.contains("x/y.txt"));
    assert_eq!(db.change_log_token().unwrap(), None);
}
