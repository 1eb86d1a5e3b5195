//! [`TradeGate`] over the broker's polled file protocol

use crate::codec::{self, ResultLine, UpdateLine, CANCEL_HEADER, ORDER_HEADER};
use crate::config::FileGateConfig;
use crate::error::{FileGateError, Result};
use crate::lock::{append_locked, LockPolicy};
use crate::reader::{read_log, read_table, Table, TableSpec};
use crate::store::{LogOffsets, OrderMap, StateStore};
use chrono::NaiveDate;
use csv::StringRecord;
use std::sync::Arc;
use strategy_scheduler::Clock;
use tracing::{debug, error, info, warn};
use trade_account::{
    BalanceSnapshot, CashSnapshot, GateResult, Order, OrderSide, OrderSnapshot, OrderStatus,
    PositionSnapshot, TradeGate,
};

const ASSET_TABLE: TableSpec<'static> = TableSpec { name: "asset", terminator_column: "acct" };
const POSITION_TABLE: TableSpec<'static> =
    TableSpec { name: "position", terminator_column: "symbol" };

/// State for the trading day currently being served
struct DayState {
    date: NaiveDate,
    store: StateStore,
    orders: OrderMap,
    offsets: LogOffsets,
}

pub struct FileTradeGate {
    config: FileGateConfig,
    clock: Arc<dyn Clock>,
    day: Option<DayState>,
}

impl FileTradeGate {
    pub fn new(config: FileGateConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock, day: None }
    }

    pub fn config(&self) -> &FileGateConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.day.is_some()
    }

    /// Orders tracked for the current day
    pub fn tracked_orders(&self) -> Option<&OrderMap> {
        self.day.as_ref().map(|day| &day.orders)
    }

    fn lock_policy(&self) -> LockPolicy {
        LockPolicy { timeout: self.config.lock_timeout(), poll: self.config.lock_poll() }
    }

    fn load_day(&self, date: NaiveDate) -> Result<DayState> {
        let store = StateStore::new(
            self.config.orders_state_file(date),
            self.config.offsets_state_file(date),
        );
        let (orders, offsets) = store.load()?;
        Ok(DayState { date, store, orders, offsets })
    }

    /// Current day's state, switching to a fresh day after midnight
    fn current_day(&mut self) -> Result<&mut DayState> {
        let today = self.clock.now().date();
        let stale = match &self.day {
            None => return Err(FileGateError::NotReady),
            Some(day) => day.date != today,
        };
        if stale {
            info!("Trading day changed to {}, switching gate state", today);
            let day = self.load_day(today)?;
            self.day = Some(day);
        }
        self.day.as_mut().ok_or(FileGateError::NotReady)
    }

    fn submit(&mut self, order: &Order) -> Result<()> {
        let date = self.current_day()?.date;
        let now = self.clock.now();
        let policy = self.lock_policy();
        let row = codec::encode_order(order, &self.config, now)?;
        let path = self.config.order_file(date);
        append_locked(&path, ORDER_HEADER, &[row], policy)?;
        info!("Order {} written to {}", order.order_id, path.display());

        let day = self.current_day()?;
        let mut snapshot = OrderSnapshot::from(order);
        snapshot.status = OrderStatus::New;
        snapshot.entrust_time = Some(now);
        day.orders.insert(order.order_id.clone(), snapshot);
        if let Err(e) = day.store.save_orders(&day.orders) {
            error!("Order {} submitted but local state not saved: {}", order.order_id, e);
        }
        Ok(())
    }

    fn cancel(&mut self, order_id: &str) -> Result<()> {
        let date = self.current_day()?.date;
        let now = self.clock.now();
        let policy = self.lock_policy();
        let path = self.config.cancel_file(date);
        append_locked(&path, CANCEL_HEADER, &[codec::encode_cancel(order_id, now)], policy)?;
        info!("Cancel request for {} written to {}", order_id, path.display());
        Ok(())
    }

    fn balance(&mut self) -> Result<BalanceSnapshot> {
        let date = self.current_day()?.date;
        let attempts = self.config.read_attempts;
        let backoff = self.config.read_backoff();

        let assets = read_table(&self.config.asset_file(date), ASSET_TABLE, attempts, backoff)?;
        let positions =
            read_table(&self.config.position_file(date), POSITION_TABLE, attempts, backoff)?;

        Ok(BalanceSnapshot {
            cash: self.cash_from(&assets)?,
            positions: self.positions_from(&positions)?,
        })
    }

    fn cash_from(&self, table: &Table) -> Result<CashSnapshot> {
        let row = table
            .rows
            .iter()
            .rev()
            .find(|row| table.get(row, "acct") == Some(self.config.account_no.as_str()));
        let Some(row) = row else {
            warn!("Asset table has no row for account {}", self.config.account_no);
            return Ok(CashSnapshot::default());
        };
        Ok(CashSnapshot {
            total_asset: optional_number(table, row, "totalAsset")?,
            available_cash: optional_number(table, row, "enabledBalance")?,
            locked_cash: optional_number(table, row, "frozenBalance")?,
        })
    }

    fn positions_from(&self, table: &Table) -> Result<Vec<PositionSnapshot>> {
        let mut positions = Vec::new();
        for row in &table.rows {
            if table.get(row, "acct") != Some(self.config.account_no.as_str()) {
                continue;
            }
            let symbol = table.get(row, "symbol").unwrap_or_default();
            let code = match codec::from_broker_code(symbol) {
                Ok(code) => code,
                Err(e) => {
                    warn!("Skipping position row: {}", e);
                    continue;
                }
            };
            let amount = optional_number(table, row, "currentQty")?.unwrap_or(0.0).round();
            if amount <= 0.0 {
                continue;
            }
            let available = optional_number(table, row, "enabledQty")?.unwrap_or(0.0).round();
            positions.push(PositionSnapshot {
                code,
                side: OrderSide::Long,
                amount: amount as u64,
                available_amount: available.max(0.0) as u64,
                avg_cost: optional_number(table, row, "costPrice")?.unwrap_or(0.0),
                last_price: optional_number(table, row, "lastPrice")?,
                position_value: optional_number(table, row, "marketValue")?,
            });
        }
        Ok(positions)
    }

    /// Drain both logs into a copy of the order map; nothing is kept unless the copy
    /// is persisted
    fn orders(&mut self) -> Result<Vec<OrderSnapshot>> {
        let strict = self.config.strict_parsing;
        let date = self.current_day()?.date;
        let result_path = self.config.result_file(date);
        let update_path = self.config.update_file(date);

        let day = self.current_day()?;
        let mut orders = day.orders.clone();
        let mut offsets = day.offsets;

        let chunk = read_log(&result_path, offsets.result)?;
        for record in chunk.records {
            apply_line(&mut orders, record, strict, "order result", |orders, record| {
                let line = ResultLine::parse(record)?;
                match orders.get_mut(&line.order_id) {
                    Some(snapshot) => line.apply(snapshot),
                    None => debug!("Result for untracked order {}", line.order_id),
                }
                Ok(())
            })?;
        }
        offsets.result = chunk.next_offset;

        let chunk = read_log(&update_path, offsets.update)?;
        for record in chunk.records {
            apply_line(&mut orders, record, strict, "order update", |orders, record| {
                let line = UpdateLine::parse(record)?;
                match orders.get_mut(&line.order_id) {
                    Some(snapshot) => {
                        if !line.apply(snapshot) {
                            debug!(
                                "Ignoring stale {} update for order {}",
                                line.status, line.order_id
                            );
                        }
                    }
                    None => debug!("Update for untracked order {}", line.order_id),
                }
                Ok(())
            })?;
        }
        offsets.update = chunk.next_offset;

        if offsets != day.offsets || orders != day.orders {
            day.store.save(&orders, &offsets)?;
        }
        day.orders = orders;
        day.offsets = offsets;
        Ok(day.orders.values().cloned().collect())
    }
}

impl TradeGate for FileTradeGate {
    fn setup(&mut self) -> GateResult<()> {
        self.config.validate()?;
        std::fs::create_dir_all(&self.config.state_dir).map_err(FileGateError::from)?;
        for dir in [&self.config.order_dir, &self.config.result_dir] {
            if !dir.exists() {
                warn!("Broker directory {} does not exist yet", dir.display());
            }
        }
        let day = self.load_day(self.clock.now().date())?;
        info!(
            "File gate ready for account {} on {} with {} tracked orders",
            self.config.account_no,
            day.date,
            day.orders.len()
        );
        self.day = Some(day);
        Ok(())
    }

    fn order(&mut self, order: &Order) -> GateResult<()> {
        Ok(self.submit(order)?)
    }

    fn cancel_order(&mut self, order_id: &str) -> GateResult<()> {
        Ok(self.cancel(order_id)?)
    }

    fn sync_balance(&mut self) -> GateResult<BalanceSnapshot> {
        Ok(self.balance()?)
    }

    fn sync_orders(&mut self) -> GateResult<Vec<OrderSnapshot>> {
        Ok(self.orders()?)
    }
}

fn apply_line<F>(
    orders: &mut OrderMap,
    record: Result<StringRecord>,
    strict: bool,
    file: &str,
    apply: F,
) -> Result<()>
where
    F: FnOnce(&mut OrderMap, &StringRecord) -> Result<()>,
{
    let outcome = record.and_then(|record| {
        if codec::is_header(&record) {
            return Ok(());
        }
        apply(orders, &record)
    });
    match outcome {
        Err(e) if strict => Err(e),
        Err(e) => {
            warn!("Skipping bad {} line: {}", file, e);
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

fn optional_number(table: &Table, row: &StringRecord, column: &str) -> Result<Option<f64>> {
    match table.get(row, column) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<f64>().map(Some).map_err(|_| {
            FileGateError::malformed(column, format!("'{}' is not a number", value))
        }),
    }
}
