//! Strategy Runner
//!
//! Entry point of a strategy process. Runs until the strategy's schedules are
//! exhausted, the configured end time passes, or SIGINT/SIGTERM arrives.

use anyhow::Result;
use clap::Parser;
use strategy_runner::{Cli, TaskRunner};

fn main() -> Result<()> {
    let cli = Cli::parse();
    TaskRunner::new(cli).run()?;
    Ok(())
}
