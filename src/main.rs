//! Trisync CLI: sync a local directory against a repository directory.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use trisync::engine::arg_parser::Cli;
use trisync::engine::handle_sync;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_sync(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
