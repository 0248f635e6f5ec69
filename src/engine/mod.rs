//! Engine module: run orchestration, database facade, hashing, CLI plumbing.

pub mod arg_parser;
pub mod db_ops;
pub mod handlers;
pub mod hashing;
pub mod sync;
pub mod tools;

// Re-export commonly used items
pub use arg_parser::Cli;
pub use db_ops::SyncDatabase;
pub use handlers::handle_sync;
pub use hashing::{checksum_equals, hash_bytes, hash_file};
pub use sync::run_sync;
pub use tools::{is_ignored_name, path_relative_to, setup_ctrlc_handler};
