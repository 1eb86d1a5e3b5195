//! Order API exposed to strategy code
//!
//! Parameter checks live here and fail with [`UserError`]; broker-level failures never
//! reach the caller.

use crate::account::Account;
use crate::error::UserError;
use crate::order::{Order, OrderSide, OrderStatus, OrderStyle};
use crate::portfolio::Portfolio;
use std::cell::RefCell;
use std::rc::Rc;

/// Filter for [`TradingApi::get_orders`]; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub order_id: Option<String>,
    pub code: Option<String>,
    pub status: Option<OrderStatus>,
}

impl OrderQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.order_id.as_deref().map_or(true, |id| id == order.order_id)
            && self.code.as_deref().map_or(true, |code| code == order.code)
            && self.status.map_or(true, |status| status == order.status)
    }
}

#[derive(Clone)]
pub struct TradingApi {
    account: Rc<RefCell<Account>>,
}

impl TradingApi {
    pub fn new(account: Rc<RefCell<Account>>) -> Self {
        Self { account }
    }

    /// Submit an order; returns its id even if the broker later rejects it
    pub fn order(
        &self,
        code: &str,
        amount: i64,
        style: Option<OrderStyle>,
        side: &str,
    ) -> Result<String, UserError> {
        validate_code(code)?;
        if amount == 0 {
            return Err(UserError::invalid_param("amount must be a non-zero integer"));
        }
        let side = parse_side(side)?;
        let style = style.unwrap_or_default();
        validate_style(&style)?;

        Ok(self.account.borrow_mut().order(code, amount, style, side))
    }

    pub fn cancel_order(&self, order_id: &str) -> Result<(), UserError> {
        if order_id.trim().is_empty() {
            return Err(UserError::invalid_param("order_id must not be empty"));
        }
        self.account.borrow_mut().cancel_order(order_id);
        Ok(())
    }

    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        self.account.borrow().get_order(order_id).cloned()
    }

    pub fn get_orders(&self, query: &OrderQuery) -> Vec<Order> {
        self.account.borrow().orders().into_iter().filter(|o| query.matches(o)).cloned().collect()
    }

    pub fn portfolio(&self) -> Portfolio {
        Portfolio::from_account(&self.account.borrow())
    }
}

/// Codes look like `000001.XSHE` or `600000.XSHG`
pub fn validate_code(code: &str) -> Result<(), UserError> {
    let valid = match code.split_once('.') {
        Some((digits, exchange)) => {
            digits.len() == 6
                && digits.chars().all(|c| c.is_ascii_digit())
                && matches!(exchange, "XSHE" | "XSHG")
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(UserError::invalid_param(format!(
            "security code '{}' must be six digits followed by .XSHE or .XSHG",
            code
        )))
    }
}

pub fn parse_side(side: &str) -> Result<OrderSide, UserError> {
    match side {
        "long" => Ok(OrderSide::Long),
        "short" => Ok(OrderSide::Short),
        other => {
            Err(UserError::invalid_param(format!("side must be long or short, got '{}'", other)))
        }
    }
}

fn validate_style(style: &OrderStyle) -> Result<(), UserError> {
    let price = match style {
        OrderStyle::Limit { price } => Some(*price),
        OrderStyle::Market { protect_price } => *protect_price,
    };
    match price {
        Some(price) if !price.is_finite() || price <= 0.0 => {
            Err(UserError::invalid_param(format!("price must be positive, got {}", price)))
        }
        _ => Ok(()),
    }
}
