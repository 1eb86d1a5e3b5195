//! Appending request rows under an exclusive file lock
//!
//! The broker terminal reads the same request files, so every write holds an advisory
//! exclusive lock. The lock is polled non-blockingly until a deadline passes.

use crate::error::{FileGateError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long to wait for a request file lock
#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    pub timeout: Duration,
    pub poll: Duration,
}

/// Append `rows` to the CSV file at `path`, writing `header` first if the file is empty
pub fn append_locked<H, R>(path: &Path, header: H, rows: &[R], policy: LockPolicy) -> Result<()>
where
    H: IntoIterator,
    H::Item: AsRef<[u8]>,
    R: AsRef<[String]>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    acquire(&file, path, policy)?;

    let written = write_rows(&file, header, rows);
    if let Err(e) = FileExt::unlock(&file) {
        debug!("Unlocking {} failed: {}", path.display(), e);
    }
    written
}

fn acquire(file: &File, path: &Path, policy: LockPolicy) -> Result<()> {
    let deadline = Instant::now() + policy.timeout;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(()),
            Err(e) if is_contended(&e) => {
                if Instant::now() >= deadline {
                    return Err(FileGateError::LockTimeout(format!(
                        "{} still locked after {:?}",
                        path.display(),
                        policy.timeout
                    )));
                }
                thread::sleep(policy.poll);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn write_rows<H, R>(file: &File, header: H, rows: &[R]) -> Result<()>
where
    H: IntoIterator,
    H::Item: AsRef<[u8]>,
    R: AsRef<[String]>,
{
    let empty = file.metadata()?.len() == 0;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if empty {
        writer.write_record(header)?;
    }
    for row in rows {
        writer.write_record(row.as_ref())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn policy(timeout_ms: u64) -> LockPolicy {
        LockPolicy { timeout: Duration::from_millis(timeout_ms), poll: Duration::from_millis(10) }
    }

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cancelOrder_20240304.csv");

        append_locked(&path, ["updTime", "custBatchNo"], &[row(&["t1", "a"])], policy(100))
            .unwrap();
        append_locked(&path, ["updTime", "custBatchNo"], &[row(&["t2", "b"])], policy(100))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "updTime,custBatchNo\nt1,a\nt2,b\n");
    }

    #[test]
    fn test_times_out_while_another_holder_has_the_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("algoOrder_20240304.csv");
        let holder = OpenOptions::new().create(true).append(true).open(&path).unwrap();
        holder.lock_exclusive().unwrap();

        let result = append_locked(&path, ["updTime"], &[row(&["t1"])], policy(50));
        assert!(matches!(result, Err(FileGateError::LockTimeout(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        FileExt::unlock(&holder).unwrap();
        append_locked(&path, ["updTime"], &[row(&["t1"])], policy(50)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "updTime\nt1\n");
    }
}
