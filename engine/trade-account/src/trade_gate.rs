//! Broker gateway abstraction and the structured records it exchanges
//!
//! Gate operations return [`GateResult`]; a failed submission is a value the account
//! turns into an order rejection, never a panic or an early return through strategy
//! code.

use crate::order::{Order, OrderAction, OrderSide, OrderStatus, OrderStyle};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Broad cause of a gate failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The gate has not been set up yet
    NotReady,
    /// A broker file or channel could not be used
    Transport,
    /// A lock or read did not complete in time
    Timeout,
    /// The broker produced data the gate cannot understand
    Protocol,
    /// The request itself cannot be expressed in the broker protocol
    Invalid,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::NotReady => "not ready",
            FailureKind::Transport => "transport",
            FailureKind::Timeout => "timeout",
            FailureKind::Protocol => "protocol",
            FailureKind::Invalid => "invalid request",
        };
        f.write_str(name)
    }
}

/// Reason a gate operation failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} failure: {message}")]
pub struct GateFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl GateFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

pub type GateResult<T> = std::result::Result<T, GateFailure>;

/// Cash figures reported by the broker; absent values leave local figures untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CashSnapshot {
    pub total_asset: Option<f64>,
    pub available_cash: Option<f64>,
    pub locked_cash: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub code: String,
    #[serde(default)]
    pub side: OrderSide,
    pub amount: u64,
    pub available_amount: u64,
    pub avg_cost: f64,
    #[serde(default)]
    pub last_price: Option<f64>,
    #[serde(default)]
    pub position_value: Option<f64>,
}

/// Full cash and position view returned by [`TradeGate::sync_balance`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub cash: CashSnapshot,
    pub positions: Vec<PositionSnapshot>,
}

/// Broker-side view of one tracked order, returned by [`TradeGate::sync_orders`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: String,
    pub code: String,
    pub price: f64,
    pub amount: u64,
    #[serde(default)]
    pub side: OrderSide,
    pub action: OrderAction,
    pub status: OrderStatus,
    pub style: OrderStyle,
    pub create_time: NaiveDateTime,
    #[serde(default)]
    pub entrust_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub confirm_id: Option<String>,
    #[serde(default)]
    pub filled_amount: Option<u64>,
    #[serde(default)]
    pub canceled_amount: Option<u64>,
    #[serde(default)]
    pub deal_balance: Option<f64>,
    #[serde(default)]
    pub avg_cost: Option<f64>,
    #[serde(default)]
    pub commission: Option<f64>,
    #[serde(default)]
    pub err_msg: Option<String>,
}

impl From<&Order> for OrderSnapshot {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.order_id.clone(),
            code: order.code.clone(),
            price: order.price(),
            amount: order.amount,
            side: order.side,
            action: order.action,
            status: order.status,
            style: order.style,
            create_time: order.create_time,
            entrust_time: order.entrust_time,
            confirm_id: order.confirm_id.clone(),
            filled_amount: Some(order.filled_amount),
            canceled_amount: Some(order.canceled_amount),
            deal_balance: Some(order.deal_balance),
            avg_cost: Some(order.avg_cost),
            commission: Some(order.commission),
            err_msg: order.err_msg.clone(),
        }
    }
}

impl From<OrderSnapshot> for Order {
    fn from(snapshot: OrderSnapshot) -> Self {
        Self {
            order_id: snapshot.order_id,
            code: snapshot.code,
            side: snapshot.side,
            action: snapshot.action,
            style: snapshot.style,
            amount: snapshot.amount,
            status: snapshot.status,
            filled_amount: snapshot.filled_amount.unwrap_or(0),
            canceled_amount: snapshot.canceled_amount.unwrap_or(0),
            deal_balance: snapshot.deal_balance.unwrap_or(0.0),
            avg_cost: snapshot.avg_cost.unwrap_or(0.0),
            commission: snapshot.commission.unwrap_or(0.0),
            confirm_id: snapshot.confirm_id,
            err_msg: snapshot.err_msg,
            create_time: snapshot.create_time,
            entrust_time: snapshot.entrust_time,
        }
    }
}

/// Boundary to a brokerage.
///
/// Every call runs on the loop thread and may block for a bounded time.
pub trait TradeGate {
    /// Prepare the gate, restoring any state persisted by an earlier run
    fn setup(&mut self) -> GateResult<()>;

    /// Submit an order; not retried on failure
    fn order(&mut self, order: &Order) -> GateResult<()>;

    /// Request cancellation of a previously submitted order
    fn cancel_order(&mut self, order_id: &str) -> GateResult<()>;

    /// Pull the full cash and position view
    fn sync_balance(&mut self) -> GateResult<BalanceSnapshot>;

    /// Pull the current broker-side view of every tracked order
    fn sync_orders(&mut self) -> GateResult<Vec<OrderSnapshot>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_failure_display() {
        let failure = GateFailure::new(FailureKind::Timeout, "order file lock not acquired in 5s");
        assert_eq!(failure.to_string(), "timeout failure: order file lock not acquired in 5s");
    }

    #[test]
    fn test_snapshot_missing_optional_fields() {
        let json = r#"{
            "order_id": "7-0304093000-1",
            "code": "000001.XSHE",
            "price": 0.0,
            "amount": 100,
            "action": "open",
            "status": "open",
            "style": {"type": "market", "protect_price": null},
            "create_time": "2024-03-04T09:30:00"
        }"#;
        let snapshot: OrderSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.side, OrderSide::Long);

        let order = Order::from(snapshot);
        assert_eq!(order.filled_amount, 0);
        assert_eq!(order.status, OrderStatus::Open);
        assert!(order.confirm_id.is_none());
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let json = r#"{"order_id": "x", "code": "000001.XSHE", "amount": 100}"#;
        assert!(serde_json::from_str::<OrderSnapshot>(json).is_err());
    }

    #[test]
    fn test_order_snapshot_conversion_preserves_progress() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(9, 30, 0).unwrap();
        let mut order = Order::new(
            "7-0304093000-1",
            "000001.XSHE",
            100,
            OrderStyle::limit(9.9),
            OrderSide::Long,
            OrderAction::Open,
            now,
        );
        order.on_deal(50, 495.0).unwrap();

        let back = Order::from(OrderSnapshot::from(&order));
        assert_eq!(back, order);
    }
}
