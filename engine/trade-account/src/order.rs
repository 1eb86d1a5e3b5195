//! Orders and their lifecycle state machine

use crate::error::{AccountError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle status.
///
/// `new → open → {filling → filled} | canceling → {canceled | partly_canceled} | rejected`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Open,
    Filling,
    Filled,
    Canceling,
    PartlyCanceled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses never change again
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::PartlyCanceled
                | OrderStatus::Canceled
                | OrderStatus::Rejected
        )
    }

    /// Whether a local request transition from `self` to `next` is legal.
    ///
    /// Broker progress may skip intermediate states (an order can be filled before the
    /// acknowledgement is seen), so any forward move out of a live state is accepted.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if self.is_finished() {
            return false;
        }
        match (self, next) {
            (_, New) => false,
            (New, _) => true,
            (Open, _) => true,
            (Filling, Open) => false,
            (Filling, _) => true,
            (Canceling, Open) => false,
            (Canceling, _) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Open => "open",
            OrderStatus::Filling => "filling",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceling => "canceling",
            OrderStatus::PartlyCanceled => "partly_canceled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    #[default]
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Open,
    Close,
}

impl OrderAction {
    /// True for orders that buy: opening a long or closing a short
    pub fn is_buy(self, side: OrderSide) -> bool {
        matches!(
            (side, self),
            (OrderSide::Long, OrderAction::Open) | (OrderSide::Short, OrderAction::Close)
        )
    }
}

/// Pricing directive of an order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderStyle {
    /// Fill at whatever price the market gives, optionally capped by a protect price
    Market { protect_price: Option<f64> },
    Limit { price: f64 },
}

impl OrderStyle {
    pub fn market() -> Self {
        OrderStyle::Market { protect_price: None }
    }

    pub fn limit(price: f64) -> Self {
        OrderStyle::Limit { price }
    }

    /// Price carried by the style; zero for an unprotected market order
    pub fn price(&self) -> f64 {
        match self {
            OrderStyle::Market { protect_price } => protect_price.unwrap_or(0.0),
            OrderStyle::Limit { price } => *price,
        }
    }

    pub fn is_market(&self) -> bool {
        matches!(self, OrderStyle::Market { .. })
    }
}

impl Default for OrderStyle {
    fn default() -> Self {
        OrderStyle::market()
    }
}

/// One submission attempt and everything known about its progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub code: String,
    pub side: OrderSide,
    pub action: OrderAction,
    pub style: OrderStyle,
    pub amount: u64,
    pub status: OrderStatus,
    pub filled_amount: u64,
    pub canceled_amount: u64,
    pub deal_balance: f64,
    pub avg_cost: f64,
    pub commission: f64,
    pub confirm_id: Option<String>,
    pub err_msg: Option<String>,
    pub create_time: NaiveDateTime,
    pub entrust_time: Option<NaiveDateTime>,
}

impl Order {
    pub fn new(
        order_id: impl Into<String>,
        code: impl Into<String>,
        amount: u64,
        style: OrderStyle,
        side: OrderSide,
        action: OrderAction,
        create_time: NaiveDateTime,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            code: code.into(),
            side,
            action,
            style,
            amount,
            status: OrderStatus::New,
            filled_amount: 0,
            canceled_amount: 0,
            deal_balance: 0.0,
            avg_cost: 0.0,
            commission: 0.0,
            confirm_id: None,
            err_msg: None,
            create_time,
            entrust_time: None,
        }
    }

    pub fn price(&self) -> f64 {
        self.style.price()
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    pub fn is_buy(&self) -> bool {
        self.action.is_buy(self.side)
    }

    /// Quantity neither filled nor canceled
    pub fn unfilled_amount(&self) -> u64 {
        self.amount.saturating_sub(self.filled_amount).saturating_sub(self.canceled_amount)
    }

    /// Compare every field that changes while the order lives; identity fields are
    /// assumed stable
    pub fn is_same_progress(&self, other: &Order) -> bool {
        self.status == other.status
            && self.confirm_id == other.confirm_id
            && self.filled_amount == other.filled_amount
            && self.canceled_amount == other.canceled_amount
            && self.deal_balance == other.deal_balance
            && self.avg_cost == other.avg_cost
            && self.commission == other.commission
    }

    /// The submission was handed to the broker
    pub fn on_request_order(&mut self, entrust_time: NaiveDateTime) {
        self.entrust_time = Some(entrust_time);
    }

    pub fn on_confirmed(&mut self, confirm_id: impl Into<String>) -> Result<()> {
        self.transition(OrderStatus::Open)?;
        self.confirm_id = Some(confirm_id.into());
        Ok(())
    }

    /// Record cumulative fill progress
    pub fn on_deal(&mut self, filled_amount: u64, deal_balance: f64) -> Result<()> {
        let next = if filled_amount >= self.amount {
            OrderStatus::Filled
        } else {
            OrderStatus::Filling
        };
        self.transition(next)?;
        self.filled_amount = filled_amount.min(self.amount);
        self.deal_balance = deal_balance;
        if self.filled_amount > 0 {
            self.avg_cost = deal_balance / self.filled_amount as f64;
        }
        Ok(())
    }

    pub fn on_canceled(&mut self, canceled_amount: u64) -> Result<()> {
        let next = if self.filled_amount > 0 {
            OrderStatus::PartlyCanceled
        } else {
            OrderStatus::Canceled
        };
        self.transition(next)?;
        self.canceled_amount = canceled_amount;
        Ok(())
    }

    pub fn on_rejected(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(OrderStatus::Rejected)?;
        self.err_msg = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, next: OrderStatus) -> Result<()> {
        if next == self.status && next == OrderStatus::Filling {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(AccountError::InvalidTransition {
                order_id: self.order_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
