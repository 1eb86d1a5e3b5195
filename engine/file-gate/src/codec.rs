//! Broker record layouts and their translation to and from order snapshots

use crate::config::FileGateConfig;
use crate::error::{FileGateError, Result};
use chrono::NaiveDateTime;
use csv::StringRecord;
use trade_account::{Order, OrderSnapshot, OrderStatus, OrderStyle};

pub const ORDER_HEADER: [&str; 12] = [
    "updTime",
    "custBatchNo",
    "acctType",
    "acct",
    "symbol",
    "tradeSide",
    "targetQty",
    "targetAmt",
    "algoId",
    "priceType",
    "ticketType",
    "algoParam",
];

pub const CANCEL_HEADER: [&str; 2] = ["updTime", "custBatchNo"];

/// First field of every header line in broker-written files
pub const HEADER_MARKER: &str = "updTime";

const RESULT_FIELDS: usize = 5;
const UPDATE_FIELDS: usize = 12;

const PRICE_LIMIT: &str = "0";
const PRICE_LIMIT_UP: &str = "3";
const PRICE_LIMIT_DOWN: &str = "4";

pub fn format_time(time: NaiveDateTime) -> String {
    time.format("%Y%m%dT%H%M%S%3f").to_string()
}

/// `600000.XSHG` becomes `600000.SH`, `000001.XSHE` becomes `000001.SZ`
pub fn to_broker_code(code: &str) -> Result<String> {
    match code.split_once('.') {
        Some((digits, "XSHG")) => Ok(format!("{}.SH", digits)),
        Some((digits, "XSHE")) => Ok(format!("{}.SZ", digits)),
        _ => Err(FileGateError::UnsupportedCode(code.to_string())),
    }
}

pub fn from_broker_code(code: &str) -> Result<String> {
    match code.split_once('.') {
        Some((digits, "SH")) => Ok(format!("{}.XSHG", digits)),
        Some((digits, "SZ")) => Ok(format!("{}.XSHE", digits)),
        _ => Err(FileGateError::UnsupportedCode(code.to_string())),
    }
}

/// One row of the order request file
pub fn encode_order(
    order: &Order,
    config: &FileGateConfig,
    now: NaiveDateTime,
) -> Result<Vec<String>> {
    let symbol = to_broker_code(&order.code)?;
    let buy = order.is_buy();
    let (price_type, algo_param) = match order.style {
        OrderStyle::Limit { price } => (PRICE_LIMIT, format!("limitPrice={}", price)),
        OrderStyle::Market { .. } if buy => (PRICE_LIMIT_UP, String::new()),
        OrderStyle::Market { .. } => (PRICE_LIMIT_DOWN, String::new()),
    };

    Ok(vec![
        format_time(now),
        order.order_id.clone(),
        config.account_type.clone(),
        config.account_no.clone(),
        symbol,
        if buy { "1" } else { "2" }.to_string(),
        order.amount.to_string(),
        String::new(),
        config.algo_id.clone(),
        price_type.to_string(),
        config.ticket_type.clone(),
        algo_param,
    ])
}

pub fn encode_cancel(order_id: &str, now: NaiveDateTime) -> Vec<String> {
    vec![format_time(now), order_id.to_string()]
}

pub fn status_from_code(code: &str) -> Option<OrderStatus> {
    let status = match code.trim() {
        "0" => OrderStatus::New,
        "1" => OrderStatus::Open,
        "2" => OrderStatus::Filling,
        "3" => OrderStatus::Filled,
        "4" => OrderStatus::Canceling,
        "5" => OrderStatus::PartlyCanceled,
        "6" => OrderStatus::Canceled,
        "7" => OrderStatus::Rejected,
        _ => return None,
    };
    Some(status)
}

pub fn is_header(record: &StringRecord) -> bool {
    record.get(0).map(str::trim) == Some(HEADER_MARKER)
}

/// Terminal accept or reject outcome of one submission
#[derive(Debug, Clone, PartialEq)]
pub struct ResultLine {
    pub order_id: String,
    pub confirm_id: String,
    pub accepted: bool,
    pub err_msg: String,
}

impl ResultLine {
    pub fn parse(record: &StringRecord) -> Result<Self> {
        if record.len() != RESULT_FIELDS {
            return Err(FileGateError::malformed(
                "order result",
                format!("expected {} fields, got {}", RESULT_FIELDS, record.len()),
            ));
        }
        Ok(Self {
            order_id: required(record, 1, "order result")?,
            confirm_id: field(record, 2),
            accepted: field(record, 3) == "0",
            err_msg: field(record, 4),
        })
    }

    /// Accepting only moves a new order to open; rejection never touches a finished one
    pub fn apply(&self, snapshot: &mut OrderSnapshot) {
        if !self.confirm_id.is_empty() {
            snapshot.confirm_id = Some(self.confirm_id.clone());
        }
        if self.accepted {
            if snapshot.status == OrderStatus::New {
                snapshot.status = OrderStatus::Open;
            }
        } else if !snapshot.status.is_finished() {
            snapshot.status = OrderStatus::Rejected;
            snapshot.err_msg = Some(self.err_msg.clone());
        }
    }
}

/// Live status and fill progress of one submission
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateLine {
    pub order_id: String,
    pub confirm_id: String,
    pub order_qty: u64,
    pub filled_qty: u64,
    pub filled_amount: f64,
    pub avg_price: f64,
    pub cancel_qty: u64,
    pub status: OrderStatus,
    pub err_msg: String,
}

impl UpdateLine {
    pub fn parse(record: &StringRecord) -> Result<Self> {
        const FILE: &str = "order update";
        if record.len() != UPDATE_FIELDS {
            return Err(FileGateError::malformed(
                FILE,
                format!("expected {} fields, got {}", UPDATE_FIELDS, record.len()),
            ));
        }
        let status_code = field(record, 10);
        let status = status_from_code(&status_code).ok_or_else(|| {
            FileGateError::malformed(FILE, format!("unknown status code '{}'", status_code))
        })?;

        Ok(Self {
            order_id: required(record, 1, FILE)?,
            confirm_id: field(record, 2),
            order_qty: parse_qty(record, 5, FILE)?,
            filled_qty: parse_qty(record, 6, FILE)?,
            filled_amount: parse_number(record, 7, FILE)?,
            avg_price: parse_number(record, 8, FILE)?,
            cancel_qty: parse_qty(record, 9, FILE)?,
            status,
            err_msg: field(record, 11),
        })
    }

    /// Apply this line if it moves the order forward.
    ///
    /// Finished orders keep their terminal status, a status older than the current one
    /// is ignored and fill or cancel quantities never shrink. Returns false when the line
    /// was stale.
    pub fn apply(&self, snapshot: &mut OrderSnapshot) -> bool {
        let current = snapshot.status;
        if current != self.status && !current.can_transition_to(self.status) {
            return false;
        }
        let filled = snapshot.filled_amount.unwrap_or(0);
        if self.filled_qty < filled || self.cancel_qty < snapshot.canceled_amount.unwrap_or(0) {
            return false;
        }

        snapshot.status = self.status;
        snapshot.filled_amount = Some(self.filled_qty);
        snapshot.deal_balance = Some(self.filled_amount);
        snapshot.avg_cost = Some(self.avg_price);
        snapshot.canceled_amount = Some(self.cancel_qty);
        if !self.confirm_id.is_empty() {
            snapshot.confirm_id = Some(self.confirm_id.clone());
        }
        if !self.err_msg.is_empty() {
            snapshot.err_msg = Some(self.err_msg.clone());
        }
        true
    }
}

pub(crate) fn field(record: &StringRecord, index: usize) -> String {
    record.get(index).map(str::trim).unwrap_or_default().to_string()
}

fn required(record: &StringRecord, index: usize, file: &str) -> Result<String> {
    let value = field(record, index);
    if value.is_empty() {
        return Err(FileGateError::malformed(file, format!("field {} is empty", index)));
    }
    Ok(value)
}

/// Empty means zero
pub(crate) fn parse_number(record: &StringRecord, index: usize, file: &str) -> Result<f64> {
    let value = field(record, index);
    if value.is_empty() {
        return Ok(0.0);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FileGateError::malformed(file, format!("'{}' is not a number", value)))
}

/// Quantities may be written as `100` or `100.0`
pub(crate) fn parse_qty(record: &StringRecord, index: usize, file: &str) -> Result<u64> {
    let value = parse_number(record, index, file)?;
    if value < 0.0 {
        return Err(FileGateError::malformed(file, format!("negative quantity {}", value)));
    }
    Ok(value.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use trade_account::{OrderAction, OrderSide};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_milli_opt(9, 31, 5, 42).unwrap()
    }

    fn order(code: &str, style: OrderStyle, action: OrderAction) -> Order {
        Order::new("7-0304093105-1", code, 300, style, OrderSide::Long, action, now())
    }

    fn config() -> FileGateConfig {
        FileGateConfig {
            account_no: "10001".to_string(),
            algo_id: "TWAP".to_string(),
            ..Default::default()
        }
    }

    fn snapshot(status: OrderStatus) -> OrderSnapshot {
        let mut snapshot = OrderSnapshot::from(&order(
            "600000.XSHG",
            OrderStyle::market(),
            OrderAction::Open,
        ));
        snapshot.status = status;
        snapshot
    }

    #[test]
    fn test_code_translation() {
        assert_eq!(to_broker_code("600000.XSHG").unwrap(), "600000.SH");
        assert_eq!(to_broker_code("000001.XSHE").unwrap(), "000001.SZ");
        assert_eq!(from_broker_code("000001.SZ").unwrap(), "000001.XSHE");
        assert!(to_broker_code("AAPL.XNAS").is_err());
        assert!(from_broker_code("600000").is_err());
    }

    #[test]
    fn test_encode_limit_buy() {
        let row = encode_order(
            &order("000001.XSHE", OrderStyle::limit(12.5), OrderAction::Open),
            &config(),
            now(),
        )
        .unwrap();
        assert_eq!(row.len(), ORDER_HEADER.len());
        assert_eq!(row[0], "20240304T093105042");
        assert_eq!(row[4], "000001.SZ");
        assert_eq!(row[5], "1");
        assert_eq!(row[6], "300");
        assert_eq!(row[9], "0");
        assert_eq!(row[11], "limitPrice=12.5");
    }

    #[test]
    fn test_encode_market_orders_use_limit_sentinels() {
        let buy = encode_order(
            &order("600000.XSHG", OrderStyle::market(), OrderAction::Open),
            &config(),
            now(),
        )
        .unwrap();
        assert_eq!((buy[5].as_str(), buy[9].as_str()), ("1", "3"));

        let sell = encode_order(
            &order("600000.XSHG", OrderStyle::market(), OrderAction::Close),
            &config(),
            now(),
        )
        .unwrap();
        assert_eq!((sell[5].as_str(), sell[9].as_str()), ("2", "4"));
        assert!(sell[11].is_empty());
    }

    #[test]
    fn test_result_line_accept_and_reject() {
        let accept = StringRecord::from(vec!["t", "7-0304093105-1", "B100", "0", ""]);
        let line = ResultLine::parse(&accept).unwrap();
        let mut open = snapshot(OrderStatus::New);
        line.apply(&mut open);
        assert_eq!(open.status, OrderStatus::Open);
        assert_eq!(open.confirm_id.as_deref(), Some("B100"));

        let mut filled = snapshot(OrderStatus::Filled);
        line.apply(&mut filled);
        assert_eq!(filled.status, OrderStatus::Filled);

        let reject = StringRecord::from(vec!["t", "7-0304093105-1", "", "-1", "no funds"]);
        let mut rejected = snapshot(OrderStatus::New);
        ResultLine::parse(&reject).unwrap().apply(&mut rejected);
        assert_eq!(rejected.status, OrderStatus::Rejected);
        assert_eq!(rejected.err_msg.as_deref(), Some("no funds"));
    }

    #[test]
    fn test_update_line_progress_and_terminal_guard() {
        let record = StringRecord::from(vec![
            "t", "7-0304093105-1", "B100", "600000.SH", "1", "300", "100.0", "1050", "10.5", "0",
            "2", "",
        ]);
        let line = UpdateLine::parse(&record).unwrap();
        assert_eq!(line.status, OrderStatus::Filling);

        let mut open = snapshot(OrderStatus::Open);
        assert!(line.apply(&mut open));
        assert_eq!(open.filled_amount, Some(100));
        assert_eq!(open.avg_cost, Some(10.5));

        let mut canceled = snapshot(OrderStatus::Canceled);
        assert!(!line.apply(&mut canceled));
        assert_eq!(canceled.status, OrderStatus::Canceled);
    }

    #[test]
    fn test_update_line_never_moves_backwards() {
        let update = |filled: &'static str, status: &'static str| {
            let record = StringRecord::from(vec![
                "t", "7-0304093105-1", "B100", "600000.SH", "1", "300", filled, "0", "0", "0",
                status, "",
            ]);
            UpdateLine::parse(&record).unwrap()
        };

        let mut order = snapshot(OrderStatus::Filling);
        order.filled_amount = Some(200);
        assert!(!update("0", "1").apply(&mut order));
        assert!(!update("100", "2").apply(&mut order));
        assert_eq!(order.status, OrderStatus::Filling);
        assert_eq!(order.filled_amount, Some(200));

        let mut open = snapshot(OrderStatus::Open);
        assert!(!update("0", "0").apply(&mut open));
        assert_eq!(open.status, OrderStatus::Open);
        assert!(update("0", "1").apply(&mut open));
    }

    #[test]
    fn test_malformed_lines() {
        let short = StringRecord::from(vec!["t", "id", "B1"]);
        assert!(ResultLine::parse(&short).is_err());
        assert!(UpdateLine::parse(&short).is_err());

        let mut fields =
            vec!["t", "id", "B1", "600000.SH", "1", "300", "x", "0", "0", "0", "1", ""];
        assert!(UpdateLine::parse(&StringRecord::from(fields.clone())).is_err());
        fields[6] = "0";
        fields[10] = "9";
        assert!(UpdateLine::parse(&StringRecord::from(fields)).is_err());
    }
}
