//! Command line interface

use chrono::NaiveDateTime;
use clap::Parser;
use std::path::PathBuf;

/// Run one strategy task against the event loop
#[derive(Parser, Debug, Clone)]
#[command(name = "strategy-runner", version, about)]
pub struct Cli {
    /// Built-in strategy to run (demo, sync-only)
    #[arg(short, long)]
    pub strategy: String,

    /// Task name; two tasks with the same name cannot run at once
    #[arg(short, long)]
    pub name: String,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Log at debug level
    #[arg(long)]
    pub debug: bool,

    /// First instant events may fire at (`YYYY-MM-DD HH:MM:SS`)
    #[arg(long, value_parser = parse_datetime)]
    pub start: Option<NaiveDateTime>,

    /// Last instant events may fire at (`YYYY-MM-DD HH:MM:SS`)
    #[arg(long, value_parser = parse_datetime)]
    pub end: Option<NaiveDateTime>,
}

/// Accepts `YYYY-MM-DD HH:MM[:SS]`, the `T`-separated form, or a bare date (midnight)
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime, String> {
    const FORMATS: [&str; 4] =
        ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];
    let value = value.trim();
    for format in FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed);
        }
    }
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("invalid datetime '{}'", value))
}
