//! Read-only portfolio view handed to strategy code

use crate::account::Account;
use crate::order::OrderSide;
use crate::position::Position;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub code: String,
    pub side: OrderSide,
    pub amount: u64,
    pub available_amount: u64,
    pub locked_amount: u64,
    pub avg_cost: f64,
    pub last_price: Option<f64>,
    pub position_value: Option<f64>,
}

impl From<&Position> for PositionView {
    fn from(position: &Position) -> Self {
        Self {
            code: position.code.clone(),
            side: position.side,
            amount: position.amount,
            available_amount: position.available_amount,
            locked_amount: position.locked_amount(),
            avg_cost: position.avg_cost,
            last_price: position.last_price,
            position_value: position.position_value,
        }
    }
}

/// Copy of cash and positions taken at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub total_asset: f64,
    pub available_cash: f64,
    pub locked_cash: f64,
    pub long_positions: Vec<PositionView>,
    pub short_positions: Vec<PositionView>,
}

impl Portfolio {
    pub fn from_account(account: &Account) -> Self {
        let cash = account.cash();
        Self {
            total_asset: cash.total_asset,
            available_cash: cash.available_cash,
            locked_cash: cash.locked_cash,
            long_positions: sorted_views(account, OrderSide::Long),
            short_positions: sorted_views(account, OrderSide::Short),
        }
    }

    pub fn long_position(&self, code: &str) -> Option<&PositionView> {
        self.long_positions.iter().find(|p| p.code == code)
    }

    pub fn short_position(&self, code: &str) -> Option<&PositionView> {
        self.short_positions.iter().find(|p| p.code == code)
    }

    /// Sum of reported position values on both sides
    pub fn positions_value(&self) -> f64 {
        self.long_positions
            .iter()
            .chain(&self.short_positions)
            .filter_map(|p| p.position_value)
            .sum()
    }
}

fn sorted_views(account: &Account, side: OrderSide) -> Vec<PositionView> {
    let mut views: Vec<PositionView> =
        account.positions(side).values().map(PositionView::from).collect();
    views.sort_by(|a, b| a.code.cmp(&b.code));
    views
}
