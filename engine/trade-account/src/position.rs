//! Position tracking per security and side

use crate::order::{Order, OrderAction, OrderSide};
use crate::trade_gate::PositionSnapshot;
use serde::{Deserialize, Serialize};

/// Holdings in one security on one side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub code: String,
    pub side: OrderSide,
    pub amount: u64,
    pub available_amount: u64,
    pub avg_cost: f64,
    pub last_price: Option<f64>,
    pub position_value: Option<f64>,
}

impl Position {
    pub fn new(
        code: impl Into<String>,
        side: OrderSide,
        amount: u64,
        available_amount: u64,
    ) -> Self {
        Self {
            code: code.into(),
            side,
            amount,
            available_amount: available_amount.min(amount),
            avg_cost: 0.0,
            last_price: None,
            position_value: None,
        }
    }

    /// Quantity that cannot be sold right now
    pub fn locked_amount(&self) -> u64 {
        self.amount.saturating_sub(self.available_amount)
    }

    /// Optimistic adjustment for a just-submitted order; closing orders reserve
    /// their quantity until the next balance sync replaces this position
    pub fn on_order_created(&mut self, order: &Order) {
        if order.action == OrderAction::Close {
            self.available_amount = self.available_amount.saturating_sub(order.amount);
        }
    }
}

impl From<PositionSnapshot> for Position {
    fn from(snapshot: PositionSnapshot) -> Self {
        Self {
            code: snapshot.code,
            side: snapshot.side,
            amount: snapshot.amount,
            available_amount: snapshot.available_amount.min(snapshot.amount),
            avg_cost: snapshot.avg_cost,
            last_price: snapshot.last_price,
            position_value: snapshot.position_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderStyle;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn close_order(amount: u64) -> Order {
        let now = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(10, 0, 0).unwrap();
        let style = OrderStyle::market();
        Order::new("id", "600000.XSHG", amount, style, OrderSide::Long, OrderAction::Close, now)
    }

    #[test]
    fn test_locked_amount() {
        let position = Position::new("600000.XSHG", OrderSide::Long, 1000, 600);
        assert_eq!(position.locked_amount(), 400);
    }

    #[test]
    fn test_close_order_reserves_available() {
        let mut position = Position::new("600000.XSHG", OrderSide::Long, 1000, 600);
        position.on_order_created(&close_order(200));
        assert_eq!(position.available_amount, 400);
        assert_eq!(position.locked_amount(), 600);
    }

    #[test]
    fn test_open_order_leaves_position_alone() {
        let mut position = Position::new("600000.XSHG", OrderSide::Long, 1000, 600);
        let mut order = close_order(200);
        order.action = OrderAction::Open;
        position.on_order_created(&order);
        assert_eq!(position.available_amount, 600);
    }

    /// Property: available never underflows and locked never exceeds amount
    #[test]
    fn prop_close_never_goes_negative() {
        let close_sizes = prop::collection::vec(0u64..20_000, 1..5);
        proptest!(|(amount in 0u64..10_000, available in 0u64..10_000, closes in close_sizes)| {
            let mut position = Position::new("600000.XSHG", OrderSide::Long, amount, available);
            for close in closes {
                position.on_order_created(&close_order(close));
                prop_assert!(position.available_amount <= position.amount);
                prop_assert!(position.locked_amount() <= position.amount);
            }
        });
    }
}
