//! Crash-safe local state: the order snapshot map and the log read offsets
//!
//! Files are replaced atomically (write to a temp file, fsync, rename), so a crash
//! leaves either the old or the new version on disk, never a partial one.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use trade_account::OrderSnapshot;

/// Last-known broker view of every order submitted through the gate, keyed by order id
pub type OrderMap = BTreeMap<String, OrderSnapshot>;

/// Bytes of the result and update logs already consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogOffsets {
    pub result: u64,
    pub update: u64,
}

/// Location of one trading day's state files
#[derive(Debug, Clone)]
pub struct StateStore {
    orders_path: PathBuf,
    offsets_path: PathBuf,
}

impl StateStore {
    pub fn new(orders_path: PathBuf, offsets_path: PathBuf) -> Self {
        Self { orders_path, offsets_path }
    }

    /// Load persisted state; missing files mean a fresh day
    pub fn load(&self) -> Result<(OrderMap, LogOffsets)> {
        let orders: OrderMap = read_json(&self.orders_path)?.unwrap_or_default();
        let offsets: LogOffsets = read_json(&self.offsets_path)?.unwrap_or_default();
        info!(
            "Loaded {} orders from {} (result offset {}, update offset {})",
            orders.len(),
            self.orders_path.display(),
            offsets.result,
            offsets.update
        );
        Ok((orders, offsets))
    }

    /// Persist orders first; offsets never run ahead of the orders they produced
    pub fn save(&self, orders: &OrderMap, offsets: &LogOffsets) -> Result<()> {
        write_atomic(&self.orders_path, &serde_json::to_vec_pretty(orders)?)?;
        write_atomic(&self.offsets_path, &serde_json::to_vec(offsets)?)?;
        debug!("Saved {} orders to {}", orders.len(), self.orders_path.display());
        Ok(())
    }

    pub fn save_orders(&self, orders: &OrderMap) -> Result<()> {
        write_atomic(&self.orders_path, &serde_json::to_vec_pretty(orders)?)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replace `path` with `bytes` so readers see the old or the new content, nothing between
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)?;
    Ok(())
}
