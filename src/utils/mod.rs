//! Shared utilities: configuration record and logger setup.

pub mod config;
pub mod logger;

pub use config::{DropFirstEvent, SyncConfig};
pub use logger::setup_logging;
