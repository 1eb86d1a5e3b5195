//! # File Gate
//!
//! A [`trade_account::TradeGate`] that talks to a broker terminal through files.
//!
//! Orders and cancels are appended to per-day CSV request files under an exclusive lock.
//! The broker answers in result and update logs that are read incrementally from
//! persisted byte offsets, and in asset and position tables that are re-read whole.
//! Every order the gate submits is kept in a per-day JSON snapshot so a restarted
//! process picks up where it left off.

pub mod codec;
pub mod config;
pub mod error;
pub mod gate;
pub mod lock;
pub mod reader;
pub mod store;


pub use config::FileGateConfig;
pub use error::{FileGateError, Result};
pub use gate::FileTradeGate;
pub use store::{LogOffsets, OrderMap, StateStore};
