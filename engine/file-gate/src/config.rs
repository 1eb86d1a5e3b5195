//! Configuration for the file gate

use crate::error::{FileGateError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the broker files live and how the gate talks to them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileGateConfig {
    /// Directory watched by the broker for order and cancel requests
    pub order_dir: PathBuf,

    /// Directory where the broker writes results, updates and snapshots
    pub result_dir: PathBuf,

    /// Directory for the gate's own persisted state
    pub state_dir: PathBuf,

    /// Broker account number; rows for other accounts are ignored
    pub account_no: String,

    /// Broker account type code written into every request
    pub account_type: String,

    /// Algorithm tag written into every order request
    pub algo_id: String,

    /// Ticket type written into every order request
    pub ticket_type: String,

    /// Give up acquiring a request file lock after this long
    pub lock_timeout_ms: u64,

    /// Pause between two lock attempts
    pub lock_poll_ms: u64,

    /// Reads of a snapshot table before it is reported as incomplete
    pub read_attempts: u32,

    /// Pause between two snapshot table reads
    pub read_backoff_ms: u64,

    /// Fail the whole sync on a malformed result or update line instead of skipping it
    pub strict_parsing: bool,
}

impl Default for FileGateConfig {
    fn default() -> Self {
        Self {
            order_dir: PathBuf::from("broker/orders"),
            result_dir: PathBuf::from("broker/results"),
            state_dir: PathBuf::from("runtime/gate"),
            account_no: String::new(),
            account_type: "UM0".to_string(),
            algo_id: String::new(),
            ticket_type: "0".to_string(),
            lock_timeout_ms: 5000,
            lock_poll_ms: 50,
            read_attempts: 3,
            read_backoff_ms: 100,
            strict_parsing: false,
        }
    }
}

impl FileGateConfig {
    /// Get lock timeout as Duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Get lock poll interval as Duration
    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms)
    }

    /// Get read backoff as Duration
    pub fn read_backoff(&self) -> Duration {
        Duration::from_millis(self.read_backoff_ms)
    }

    pub fn order_file(&self, date: NaiveDate) -> PathBuf {
        dated(&self.order_dir, "algoOrder", date, "csv")
    }

    pub fn cancel_file(&self, date: NaiveDate) -> PathBuf {
        dated(&self.order_dir, "cancelOrder", date, "csv")
    }

    pub fn asset_file(&self, date: NaiveDate) -> PathBuf {
        dated(&self.result_dir, "asset", date, "csv")
    }

    pub fn position_file(&self, date: NaiveDate) -> PathBuf {
        dated(&self.result_dir, "position", date, "csv")
    }

    pub fn result_file(&self, date: NaiveDate) -> PathBuf {
        dated(&self.result_dir, "algoOrderResult", date, "csv")
    }

    pub fn update_file(&self, date: NaiveDate) -> PathBuf {
        dated(&self.result_dir, "algoOrderUpdate", date, "csv")
    }

    pub fn orders_state_file(&self, date: NaiveDate) -> PathBuf {
        dated(&self.state_dir, "orders", date, "json")
    }

    pub fn offsets_state_file(&self, date: NaiveDate) -> PathBuf {
        dated(&self.state_dir, "offsets", date, "json")
    }

    pub fn validate(&self) -> Result<()> {
        if self.account_no.trim().is_empty() {
            return Err(FileGateError::config("account_no must be set"));
        }
        if self.lock_timeout_ms == 0 || self.lock_poll_ms == 0 {
            return Err(FileGateError::config("lock timeout and poll interval must be positive"));
        }
        if self.read_attempts == 0 {
            return Err(FileGateError::config("read_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FileGateConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn dated(dir: &Path, stem: &str, date: NaiveDate, ext: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", stem, date.format("%Y%m%d"), ext))
}
