use clap::Parser;
use std::path::PathBuf;

struct DefaultArgs;

impl DefaultArgs {
    pub const DIR: &'static str = ".";
}

/// Bidirectional file sync between a local tree and a CMIS-like repository.
#[derive(Clone, Parser)]
#[command(name = "trisync")]
#[command(about = "Sync a local directory against a repository directory.")]
pub struct Cli {
    /// Local sync root. Default: current directory.
    #[arg(value_name = "DIR", default_value = DefaultArgs::DIR)]
    pub dir: PathBuf,

    /// Directory standing in for the repository.
    #[arg(long, short)]
    pub remote: PathBuf,

    /// Path to the sync database. Default: `.trisync` in DIR.
    #[arg(long, short)]
    pub db: Option<PathBuf>,

    /// Keep syncing on an interval (seconds) instead of a single pass.
    #[arg(long, short)]
    pub poll: Option<u64>,

    /// Join local and remote names case-insensitively.
    #[arg(long)]
    pub ignore_case: bool,

    /// Verbose output.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    /// Get the database path, defaulting to the hidden db file in the sync root.
    pub fn db_path(&self) -> PathBuf {
        self.db
            .clone()
            .unwrap_or_else(|| self.dir.join(concat!(".", env!("CARGO_PKG_NAME"))))
    }
}
