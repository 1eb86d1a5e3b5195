//! Account state and reconciliation against the trade gate
//!
//! All methods run on the loop thread. Broker failures are logged and leave the prior
//! state untouched; a failed submission is recorded on the order as a rejection.

use crate::config::AccountConfig;
use crate::error::Result;
use crate::id::OrderIdProducer;
use crate::order::{Order, OrderAction, OrderSide, OrderStatus, OrderStyle};
use crate::position::Position;
use crate::trade_gate::{CashSnapshot, TradeGate};
use crate::ACCOUNT_SYNC_CLASS;
use chrono::{NaiveDateTime, NaiveTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use strategy_scheduler::{
    Clock, EventClassRegistry, EventKind, EventSource, EventSourceScheduler, MarketSession,
    ScheduleId, TimeExpr,
};
use tracing::{debug, error, info, warn};

/// Cash figures of the account
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CashInfo {
    pub total_asset: f64,
    pub available_cash: f64,
    pub locked_cash: f64,
}

impl CashInfo {
    /// Take every reported, non-zero figure; keep the rest
    pub fn merge(&mut self, snapshot: &CashSnapshot) {
        let reported = |value: Option<f64>| value.filter(|v| *v != 0.0);
        if let Some(total_asset) = reported(snapshot.total_asset) {
            self.total_asset = total_asset;
        }
        if let Some(available_cash) = reported(snapshot.available_cash) {
            self.available_cash = available_cash;
        }
        if let Some(locked_cash) = reported(snapshot.locked_cash) {
            self.locked_cash = locked_cash;
        }
    }
}

/// What a reconciliation update means for the strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Acknowledged,
    Deal,
    CancelAcknowledged,
    Canceled,
    Rejected,
}

/// Emitted when reconciliation replaces a local order with a different broker view
#[derive(Debug, Clone)]
pub struct OrderNotice {
    pub kind: NoticeKind,
    pub previous: Order,
    pub current: Order,
}

type OrderObserver = Box<dyn FnMut(&OrderNotice)>;

pub struct Account {
    config: AccountConfig,
    gate: Box<dyn TradeGate>,
    clock: Arc<dyn Clock>,
    id_producer: OrderIdProducer,
    orders: HashMap<String, Order>,
    long_positions: HashMap<String, Position>,
    short_positions: HashMap<String, Position>,
    cash: CashInfo,
    observers: Vec<OrderObserver>,
    has_synced: bool,
    sync_schedule: Option<ScheduleId>,
}

impl Account {
    pub fn new(config: AccountConfig, gate: Box<dyn TradeGate>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            gate,
            clock,
            id_producer: OrderIdProducer::new(),
            orders: HashMap::new(),
            long_positions: HashMap::new(),
            short_positions: HashMap::new(),
            cash: CashInfo::default(),
            observers: Vec::new(),
            has_synced: false,
            sync_schedule: None,
        }
    }

    /// Set up the gate and, if configured, arm the periodic sync timer and run one
    /// sync of each enabled kind right away.
    ///
    /// Periodic syncs only fire between `start` and `end`, both inclusive.
    pub fn setup(
        account: &Rc<RefCell<Account>>,
        scheduler: &EventSourceScheduler,
        registry: &mut EventClassRegistry,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
    ) -> Result<()> {
        let (config, now) = {
            let mut this = account.borrow_mut();
            this.config.validate()?;
            this.gate.setup()?;
            (this.config.clone(), this.clock.now())
        };

        if !config.sync_enabled() {
            info!("Periodic account sync disabled");
            return Ok(());
        }

        let class = registry.get_or_create(ACCOUNT_SYNC_CLASS, EventKind::AccountSync);
        let mut source = EventSource::new(MarketSession::default(), start).with_end(end);
        let times = sync_times(&config, now);
        info!(
            "Account sync every {}s at {} daily instants (balance: {}, orders: {})",
            config.sync_interval_secs,
            times.len(),
            config.sync_balance,
            config.sync_order
        );
        for time in times {
            source.daily_expr(class, TimeExpr::Absolute(time));
        }

        let bus = scheduler.bus();
        if config.sync_balance {
            let weak = Rc::downgrade(account);
            bus.register(
                class,
                move |_| {
                    with_account(&weak, Account::sync_balance);
                    Ok(())
                },
                0,
            );
        }
        if config.sync_order {
            let weak = Rc::downgrade(account);
            bus.register(
                class,
                move |_| {
                    with_account(&weak, Account::sync_orders);
                    Ok(())
                },
                0,
            );
        }

        let schedule = scheduler.schedule(Rc::new(RefCell::new(source)));
        let mut this = account.borrow_mut();
        this.sync_schedule = Some(schedule);
        if config.sync_balance {
            this.sync_balance();
        }
        if config.sync_order {
            this.sync_orders();
        }
        Ok(())
    }

    /// Record and submit an order. A positive amount opens, a negative one closes.
    ///
    /// Always returns the new order id; a submission failure marks the order rejected.
    pub fn order(&mut self, code: &str, amount: i64, style: OrderStyle, side: OrderSide) -> String {
        let action = if amount < 0 { OrderAction::Close } else { OrderAction::Open };
        let now = self.clock.now();
        let order_id = self.id_producer.next_id(now);
        let mut order =
            Order::new(order_id.clone(), code, amount.unsigned_abs(), style, side, action, now);
        self.orders.insert(order_id.clone(), order.clone());
        info!(
            "Submitting order {}: {} {:?} {:?} {} @ {:?}",
            order_id, code, side, action, order.amount, style
        );

        match self.gate.order(&order) {
            Ok(()) => {
                order.on_request_order(self.clock.now());
                let positions = match side {
                    OrderSide::Long => &mut self.long_positions,
                    OrderSide::Short => &mut self.short_positions,
                };
                if let Some(position) = positions.get_mut(code) {
                    position.on_order_created(&order);
                }
            }
            Err(failure) => {
                error!("Order {} submission failed: {}", order_id, failure);
                if let Err(e) = order.on_rejected(failure.to_string()) {
                    warn!("Could not mark order {} rejected: {}", order_id, e);
                }
            }
        }

        self.orders.insert(order_id.clone(), order);
        order_id
    }

    /// Ask the broker to cancel an order; unknown ids and failures are only logged
    pub fn cancel_order(&mut self, order_id: &str) {
        if !self.orders.contains_key(order_id) {
            error!("Cannot cancel unknown order {}", order_id);
            return;
        }
        info!("Canceling order {}", order_id);
        if let Err(failure) = self.gate.cancel_order(order_id) {
            error!("Cancel of order {} failed: {}", order_id, failure);
        }
    }

    /// Replace cash and positions with the broker's view
    pub fn sync_balance(&mut self) {
        let snapshot = match self.gate.sync_balance() {
            Ok(snapshot) => snapshot,
            Err(failure) => {
                error!("Balance sync failed: {}", failure);
                return;
            }
        };

        self.cash.merge(&snapshot.cash);
        self.long_positions.clear();
        self.short_positions.clear();
        for position in snapshot.positions.into_iter().map(Position::from) {
            let table = match position.side {
                OrderSide::Long => &mut self.long_positions,
                OrderSide::Short => &mut self.short_positions,
            };
            table.insert(position.code.clone(), position);
        }
        debug!(
            "Balance synced: total_asset={} available_cash={} long={} short={}",
            self.cash.total_asset,
            self.cash.available_cash,
            self.long_positions.len(),
            self.short_positions.len()
        );
    }

    /// Reconcile local orders with the broker's view and notify on every change
    pub fn sync_orders(&mut self) {
        let snapshots = match self.gate.sync_orders() {
            Ok(snapshots) => snapshots,
            Err(failure) => {
                error!("Order sync failed: {}", failure);
                return;
            }
        };

        let mut changed = Vec::new();
        for remote in snapshots.into_iter().map(Order::from) {
            match self.orders.get(&remote.order_id) {
                None => {
                    if self.has_synced {
                        warn!("Order {} unknown to local state, adopting it", remote.order_id);
                    } else {
                        info!("Loaded order {} ({})", remote.order_id, remote.status);
                    }
                    self.orders.insert(remote.order_id.clone(), remote);
                }
                Some(local) if local.is_same_progress(&remote) => {}
                Some(local) => {
                    let previous = local.clone();
                    self.orders.insert(remote.order_id.clone(), remote.clone());
                    changed.push((previous, remote));
                }
            }
        }
        self.has_synced = true;

        for (previous, current) in changed {
            self.notify_changed(previous, current);
        }
    }

    /// Register an observer of reconciliation notices.
    ///
    /// Observers run while the account is borrowed and must not call back into it.
    pub fn add_observer<F>(&mut self, observer: F)
    where
        F: FnMut(&OrderNotice) + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    pub fn get_order(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// All orders, oldest first
    pub fn orders(&self) -> Vec<&Order> {
        let mut orders: Vec<&Order> = self.orders.values().collect();
        orders.sort_by(|a, b| (a.create_time, &a.order_id).cmp(&(b.create_time, &b.order_id)));
        orders
    }

    pub fn positions(&self, side: OrderSide) -> &HashMap<String, Position> {
        match side {
            OrderSide::Long => &self.long_positions,
            OrderSide::Short => &self.short_positions,
        }
    }

    pub fn position(&self, code: &str, side: OrderSide) -> Option<&Position> {
        self.positions(side).get(code)
    }

    pub fn cash(&self) -> &CashInfo {
        &self.cash
    }

    pub fn has_synced(&self) -> bool {
        self.has_synced
    }

    pub fn sync_schedule(&self) -> Option<ScheduleId> {
        self.sync_schedule
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    fn notify_changed(&mut self, previous: Order, current: Order) {
        let Some(kind) = notice_kind(&previous, &current) else {
            return;
        };

        match kind {
            NoticeKind::Acknowledged => {
                info!("Order {} acknowledged by broker", current.order_id)
            }
            NoticeKind::Deal => info!(
                "Order {} dealt {}/{} avg_cost={}",
                current.order_id, current.filled_amount, current.amount, current.avg_cost
            ),
            NoticeKind::CancelAcknowledged => {
                info!("Order {} cancel acknowledged", current.order_id)
            }
            NoticeKind::Canceled => info!(
                "Order {} canceled ({} canceled, {} filled)",
                current.order_id, current.canceled_amount, current.filled_amount
            ),
            NoticeKind::Rejected => warn!(
                "Order {} rejected: {}",
                current.order_id,
                current.err_msg.as_deref().unwrap_or("no reason given")
            ),
        }

        let notice = OrderNotice { kind, previous, current };
        for observer in &mut self.observers {
            observer(&notice);
        }
    }
}

/// Classify a reconciliation update; `None` means nothing worth reporting
pub(crate) fn notice_kind(previous: &Order, current: &Order) -> Option<NoticeKind> {
    if previous.is_finished() {
        return None;
    }
    if previous.status == current.status {
        return (current.status == OrderStatus::Filling).then_some(NoticeKind::Deal);
    }

    match current.status {
        OrderStatus::Open => {
            (previous.status == OrderStatus::New).then_some(NoticeKind::Acknowledged)
        }
        OrderStatus::Filling | OrderStatus::Filled => Some(NoticeKind::Deal),
        OrderStatus::Canceling => Some(NoticeKind::CancelAcknowledged),
        OrderStatus::Canceled | OrderStatus::PartlyCanceled => Some(NoticeKind::Canceled),
        OrderStatus::Rejected => Some(NoticeKind::Rejected),
        OrderStatus::New => None,
    }
}

/// Daily instants at which the sync timer fires.
///
/// Without sync periods the grid runs from one interval after `now` up to 23:59:59.
fn sync_times(config: &AccountConfig, now: NaiveDateTime) -> Vec<NaiveTime> {
    let step = chrono::Duration::seconds(config.sync_interval_secs.max(1) as i64);

    if config.sync_periods.is_empty() {
        let now = now.trunc_subsecs(0);
        let mut times = Vec::new();
        let mut current = now + step;
        while current.date() == now.date() {
            times.push(current.time());
            current += step;
        }
        return times;
    }

    let mut times = Vec::new();
    for period in &config.sync_periods {
        let mut current = period.start;
        while current <= period.end {
            times.push(current);
            let (next, wrapped) = current.overflowing_add_signed(step);
            if wrapped != 0 {
                break;
            }
            current = next;
        }
    }
    times
}

fn with_account(weak: &Weak<RefCell<Account>>, f: fn(&mut Account)) {
    let Some(account) = weak.upgrade() else {
        return;
    };
    match account.try_borrow_mut() {
        Ok(mut account) => f(&mut account),
        Err(_) => warn!("Account busy, skipping scheduled sync"),
    };
}
