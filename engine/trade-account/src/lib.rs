//! # Trade Account
//!
//! Local order, position and cash state for one strategy process, kept in step with a
//! broker through the [`TradeGate`] abstraction.
//!
//! Orders are recorded before any broker I/O and only ever change through their own
//! request transitions or by wholesale replacement with a broker snapshot during
//! reconciliation. Positions are replaced on every balance sync.

pub mod account;
pub mod api;
pub mod config;
pub mod error;
pub mod id;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod trade_gate;

#[cfg(test)]
mod tests;

pub use account::{Account, CashInfo, NoticeKind, OrderNotice};
pub use api::{OrderQuery, TradingApi};
pub use config::AccountConfig;
pub use error::{AccountError, Result, UserError};
pub use id::OrderIdProducer;
pub use order::{Order, OrderAction, OrderSide, OrderStatus, OrderStyle};
pub use portfolio::{Portfolio, PositionView};
pub use position::Position;
pub use trade_gate::{
    BalanceSnapshot, CashSnapshot, FailureKind, GateFailure, GateResult, OrderSnapshot,
    PositionSnapshot, TradeGate,
};

/// Name of the event class that drives periodic account syncs
pub const ACCOUNT_SYNC_CLASS: &str = "AccountSync";
