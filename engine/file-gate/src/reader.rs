//! Reading broker-written files
//!
//! Result and update logs are consumed incrementally from a byte offset, whole lines
//! only. Asset and position tables are re-read in full and retried until the last row
//! is a terminator.

use crate::error::{FileGateError, Result};
use csv::StringRecord;
use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Complete lines appended to a log since the last read
#[derive(Debug)]
pub struct LogChunk {
    /// One entry per line; lines the CSV reader cannot decode are kept as errors
    pub records: Vec<Result<StringRecord>>,
    pub next_offset: u64,
}

/// Read every complete line after `offset`.
///
/// A trailing line without a newline is left for the next call. A missing file yields
/// nothing and keeps the offset.
pub fn read_log(path: &Path, offset: u64) -> Result<LogChunk> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(LogChunk { records: Vec::new(), next_offset: offset });
        }
        Err(e) => return Err(e.into()),
    };

    let len = file.metadata()?.len();
    let start = if len < offset {
        warn!("{} shrank below offset {} to {} bytes, rereading", path.display(), offset, len);
        0
    } else {
        offset
    };
    file.seek(SeekFrom::Start(start))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let Some(last_newline) = bytes.iter().rposition(|b| *b == b'\n') else {
        return Ok(LogChunk { records: Vec::new(), next_offset: start });
    };
    let complete = &bytes[..=last_newline];

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(complete);
    let records: Vec<Result<StringRecord>> =
        reader.records().map(|r| r.map_err(FileGateError::from)).collect();
    debug!("Read {} lines from {} at offset {}", records.len(), path.display(), start);

    Ok(LogChunk { records, next_offset: start + complete.len() as u64 })
}

/// One snapshot block of a broker table, looked up by column name
#[derive(Debug, Clone)]
pub struct Table {
    columns: HashMap<String, usize>,
    pub rows: Vec<StringRecord>,
}

impl Table {
    pub fn get<'a>(&self, row: &'a StringRecord, column: &str) -> Option<&'a str> {
        self.columns.get(column).and_then(|index| row.get(*index)).map(str::trim)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }
}

/// How to recognise the row that closes a snapshot block
#[derive(Debug, Clone, Copy)]
pub struct TableSpec<'a> {
    pub name: &'a str,
    pub terminator_column: &'a str,
}

/// Read the last complete block of a snapshot table, retrying while it is missing or
/// mid-write
pub fn read_table(
    path: &Path,
    spec: TableSpec<'_>,
    attempts: u32,
    backoff: Duration,
) -> Result<Table> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match read_table_once(path, spec) {
            Ok(table) => return Ok(table),
            Err(e) if attempt < attempts => {
                debug!("{} read attempt {}/{} failed: {}", spec.name, attempt, attempts, e);
                thread::sleep(backoff);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn read_table_once(path: &Path, spec: TableSpec<'_>) -> Result<Table> {
    let mut reader = match csv::ReaderBuilder::new().flexible(true).from_path(path) {
        Ok(reader) => reader,
        Err(e) => match e.kind() {
            csv::ErrorKind::Io(io) if io.kind() == ErrorKind::NotFound => {
                return Err(FileGateError::incomplete(format!(
                    "{} file {} does not exist",
                    spec.name,
                    path.display()
                )));
            }
            _ => return Err(e.into()),
        },
    };

    let columns: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(index, name)| (name.trim().to_string(), index))
        .collect();
    let terminator = *columns.get(spec.terminator_column).ok_or_else(|| {
        FileGateError::malformed(
            spec.name,
            format!("missing column {}", spec.terminator_column),
        )
    })?;

    let mut blocks = Vec::new();
    let mut current = Vec::new();
    let mut closed = false;
    for record in reader.records() {
        let record = record?;
        if record.get(terminator).map_or(true, |v| v.trim().is_empty()) {
            blocks.push(std::mem::take(&mut current));
            closed = true;
        } else {
            current.push(record);
            closed = false;
        }
    }

    if !closed {
        return Err(FileGateError::incomplete(format!(
            "{} file {} does not end with a terminator row",
            spec.name,
            path.display()
        )));
    }
    let rows = blocks.pop().unwrap_or_default();
    Ok(Table { columns, rows })
}
