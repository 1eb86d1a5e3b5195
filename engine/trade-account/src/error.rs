//! Error types for the account

use crate::order::OrderStatus;
use crate::trade_gate::GateFailure;
use strategy_scheduler::SchedulerError;
use thiserror::Error;

/// Result type alias for account operations
pub type Result<T> = std::result::Result<T, AccountError>;

/// Errors that can occur while managing account state
#[derive(Error, Debug)]
pub enum AccountError {
    /// Trade gate failures surfaced during setup
    #[error("Trade gate error: {0}")]
    Gate(#[from] GateFailure),

    /// Scheduling the sync timer failed
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// A local request transition that the order state machine forbids
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition { order_id: String, from: OrderStatus, to: OrderStatus },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad input from strategy code
    #[error(transparent)]
    User(#[from] UserError),
}

impl AccountError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Errors caused by strategy code; surfaced immediately and never retried
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserError {
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid call: {0}")]
    InvalidCall(String),
}

impl UserError {
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParam(msg.into())
    }

    pub fn invalid_call(msg: impl Into<String>) -> Self {
        Self::InvalidCall(msg.into())
    }
}
