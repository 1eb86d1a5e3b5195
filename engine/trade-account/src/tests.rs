//! Account tests against an in-memory trade gate

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use strategy_scheduler::{
    Clock, Event, EventClassRegistry, EventLoop, EventSourceScheduler, MarketPeriod,
    SchedulerBus, SimulatedClock,
};

use crate::{
    Account, AccountConfig, BalanceSnapshot, CashSnapshot, FailureKind, GateFailure, GateResult,
    NoticeKind, OrderQuery, OrderSide, OrderSnapshot, OrderStatus, OrderStyle, PositionSnapshot,
    TradeGate, TradingApi, UserError, ACCOUNT_SYNC_CLASS,
};

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(h, m, s).unwrap()
}

#[derive(Default)]
struct MockState {
    submitted: Vec<String>,
    canceled: Vec<String>,
    fail_orders: bool,
    fail_balance: bool,
    balance: BalanceSnapshot,
    remote_orders: Vec<OrderSnapshot>,
    setup_calls: usize,
    balance_calls: usize,
    order_calls: usize,
}

#[derive(Clone, Default)]
struct MockGate {
    state: Rc<RefCell<MockState>>,
}

impl TradeGate for MockGate {
    fn setup(&mut self) -> GateResult<()> {
        self.state.borrow_mut().setup_calls += 1;
        Ok(())
    }

    fn order(&mut self, order: &crate::Order) -> GateResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_orders {
            return Err(GateFailure::new(FailureKind::Timeout, "lock not acquired"));
        }
        state.submitted.push(order.order_id.clone());
        Ok(())
    }

    fn cancel_order(&mut self, order_id: &str) -> GateResult<()> {
        self.state.borrow_mut().canceled.push(order_id.to_string());
        Ok(())
    }

    fn sync_balance(&mut self) -> GateResult<BalanceSnapshot> {
        let mut state = self.state.borrow_mut();
        state.balance_calls += 1;
        if state.fail_balance {
            return Err(GateFailure::new(FailureKind::Transport, "asset file missing"));
        }
        Ok(state.balance.clone())
    }

    fn sync_orders(&mut self) -> GateResult<Vec<OrderSnapshot>> {
        let mut state = self.state.borrow_mut();
        state.order_calls += 1;
        Ok(state.remote_orders.clone())
    }
}

fn account_with(gate: MockGate, now: NaiveDateTime) -> Rc<RefCell<Account>> {
    let clock = Arc::new(SimulatedClock::new(now));
    Rc::new(RefCell::new(Account::new(AccountConfig::default(), Box::new(gate), clock)))
}

fn remote_with(account: &Account, order_id: &str, status: OrderStatus) -> OrderSnapshot {
    let mut snapshot = OrderSnapshot::from(account.get_order(order_id).unwrap());
    snapshot.status = status;
    snapshot
}

fn position(code: &str, amount: u64, available: u64) -> PositionSnapshot {
    PositionSnapshot {
        code: code.to_string(),
        side: OrderSide::Long,
        amount,
        available_amount: available,
        avg_cost: 10.0,
        last_price: Some(10.5),
        position_value: Some(amount as f64 * 10.5),
    }
}

#[test]
fn test_order_is_recorded_as_new() {
    let gate = MockGate::default();
    let account = account_with(gate.clone(), at(10, 0, 0));
    let api = TradingApi::new(account.clone());

    let id = api.order("000001.XSHE", 100, Some(OrderStyle::limit(12.5)), "long").unwrap();

    let order = api.get_order(&id).unwrap();
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.entrust_time, Some(at(10, 0, 0)));
    assert_eq!(gate.state.borrow().submitted, vec![id]);
}

#[test]
fn test_gate_failure_rejects_but_returns_id() {
    let gate = MockGate::default();
    gate.state.borrow_mut().fail_orders = true;
    let account = account_with(gate.clone(), at(10, 0, 0));
    let api = TradingApi::new(account);

    let id = api.order("000001.XSHE", 100, None, "long").unwrap();

    let order = api.get_order(&id).unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    assert!(order.err_msg.unwrap().contains("lock not acquired"));
    assert!(gate.state.borrow().submitted.is_empty());
}

#[test]
fn test_invalid_parameters_never_reach_the_gate() {
    let gate = MockGate::default();
    let api = TradingApi::new(account_with(gate.clone(), at(10, 0, 0)));

    assert!(matches!(api.order("000001.SZ", 100, None, "long"), Err(UserError::InvalidParam(_))));
    assert!(api.order("000001.XSHE", 0, None, "long").is_err());
    assert!(api.order("000001.XSHE", 100, Some(OrderStyle::limit(-1.0)), "long").is_err());
    assert!(api.order("000001.XSHE", 100, None, "sideways").is_err());
    assert!(gate.state.borrow().submitted.is_empty());
    assert!(api.get_orders(&OrderQuery::all()).is_empty());
}

#[test]
fn test_acknowledgement_notifies_once() {
    let gate = MockGate::default();
    let account = account_with(gate.clone(), at(10, 0, 0));
    let notices = Rc::new(RefCell::new(Vec::new()));
    let log = notices.clone();
    account.borrow_mut().add_observer(move |notice| log.borrow_mut().push(notice.kind));

    let id = account.borrow_mut().order("600000.XSHG", 200, OrderStyle::market(), OrderSide::Long);
    let open = remote_with(&account.borrow(), &id, OrderStatus::Open);
    gate.state.borrow_mut().remote_orders = vec![open];

    account.borrow_mut().sync_orders();
    account.borrow_mut().sync_orders();

    assert_eq!(*notices.borrow(), vec![NoticeKind::Acknowledged]);
    assert_eq!(account.borrow().get_order(&id).unwrap().status, OrderStatus::Open);
}

#[test]
fn test_fill_after_partial_fill_is_a_deal_only() {
    let gate = MockGate::default();
    let account = account_with(gate.clone(), at(10, 0, 0));
    let notices = Rc::new(RefCell::new(Vec::new()));
    let log = notices.clone();
    account.borrow_mut().add_observer(move |notice| log.borrow_mut().push(notice.kind));

    let id = account.borrow_mut().order("600000.XSHG", 200, OrderStyle::market(), OrderSide::Long);
    let mut filling = remote_with(&account.borrow(), &id, OrderStatus::Filling);
    filling.filled_amount = Some(100);
    gate.state.borrow_mut().remote_orders = vec![filling.clone()];
    account.borrow_mut().sync_orders();

    let mut filled = filling;
    filled.status = OrderStatus::Filled;
    filled.filled_amount = Some(200);
    gate.state.borrow_mut().remote_orders = vec![filled];
    account.borrow_mut().sync_orders();

    assert_eq!(*notices.borrow(), vec![NoticeKind::Deal, NoticeKind::Deal]);
    assert_eq!(account.borrow().get_order(&id).unwrap().filled_amount, 200);
}

#[test]
fn test_unknown_remote_orders_are_adopted_silently() {
    let gate = MockGate::default();
    let account = account_with(gate.clone(), at(10, 0, 0));
    let notices = Rc::new(RefCell::new(0));
    let count = notices.clone();
    account.borrow_mut().add_observer(move |_| *count.borrow_mut() += 1);

    let other = "4242-0304090000-1".to_string();
    let snapshot = OrderSnapshot {
        order_id: other.clone(),
        code: "600000.XSHG".to_string(),
        price: 0.0,
        amount: 100,
        side: OrderSide::Long,
        action: crate::OrderAction::Open,
        status: OrderStatus::Filled,
        style: OrderStyle::market(),
        create_time: at(9, 0, 0),
        entrust_time: None,
        confirm_id: Some("B1".to_string()),
        filled_amount: Some(100),
        canceled_amount: None,
        deal_balance: Some(1000.0),
        avg_cost: Some(10.0),
        commission: None,
        err_msg: None,
    };
    gate.state.borrow_mut().remote_orders = vec![snapshot];

    account.borrow_mut().sync_orders();

    assert!(account.borrow().has_synced());
    assert_eq!(account.borrow().get_order(&other).unwrap().status, OrderStatus::Filled);
    assert_eq!(*notices.borrow(), 0);
}

#[test]
fn test_cancel_of_unknown_order_is_ignored() {
    let gate = MockGate::default();
    let api = TradingApi::new(account_with(gate.clone(), at(10, 0, 0)));

    api.cancel_order("no-such-order").unwrap();
    assert!(gate.state.borrow().canceled.is_empty());

    let id = api.order("000001.XSHE", 100, None, "long").unwrap();
    api.cancel_order(&id).unwrap();
    assert_eq!(gate.state.borrow().canceled, vec![id]);
}

#[test]
fn test_failed_balance_sync_keeps_state() {
    let gate = MockGate::default();
    gate.state.borrow_mut().balance = BalanceSnapshot {
        cash: CashSnapshot {
            total_asset: Some(100_000.0),
            available_cash: Some(40_000.0),
            locked_cash: None,
        },
        positions: vec![position("600000.XSHG", 1000, 1000)],
    };
    let account = account_with(gate.clone(), at(10, 0, 0));
    account.borrow_mut().sync_balance();

    gate.state.borrow_mut().fail_balance = true;
    account.borrow_mut().sync_balance();

    let portfolio = TradingApi::new(account).portfolio();
    assert_eq!(portfolio.total_asset, 100_000.0);
    assert_eq!(portfolio.available_cash, 40_000.0);
    assert_eq!(portfolio.long_positions.len(), 1);
}

#[test]
fn test_balance_sync_replaces_positions() {
    let gate = MockGate::default();
    gate.state.borrow_mut().balance.positions =
        vec![position("600000.XSHG", 1000, 1000), position("000001.XSHE", 500, 0)];
    let account = account_with(gate.clone(), at(10, 0, 0));
    account.borrow_mut().sync_balance();

    gate.state.borrow_mut().balance.positions = vec![position("000001.XSHE", 500, 500)];
    account.borrow_mut().sync_balance();

    let portfolio = TradingApi::new(account).portfolio();
    let codes: Vec<&str> = portfolio.long_positions.iter().map(|p| p.code.as_str()).collect();
    assert_eq!(codes, vec!["000001.XSHE"]);
    assert_eq!(portfolio.long_position("000001.XSHE").unwrap().locked_amount, 0);
}

#[test]
fn test_close_order_reserves_position() {
    let gate = MockGate::default();
    gate.state.borrow_mut().balance.positions = vec![position("600000.XSHG", 1000, 800)];
    let account = account_with(gate.clone(), at(10, 0, 0));
    account.borrow_mut().sync_balance();
    let api = TradingApi::new(account.clone());

    let id = api.order("600000.XSHG", -300, None, "long").unwrap();

    let order = api.get_order(&id).unwrap();
    assert_eq!(order.action, crate::OrderAction::Close);
    assert_eq!(order.amount, 300);
    let position = account.borrow().position("600000.XSHG", OrderSide::Long).cloned().unwrap();
    assert_eq!(position.available_amount, 500);
    assert_eq!(position.locked_amount(), 500);
}

#[test]
fn test_get_orders_filters() {
    let gate = MockGate::default();
    let account = account_with(gate.clone(), at(10, 0, 0));
    let api = TradingApi::new(account);
    let first = api.order("600000.XSHG", 100, None, "long").unwrap();
    api.order("000001.XSHE", 100, None, "long").unwrap();

    let by_code = api.get_orders(&OrderQuery::all().with_code("600000.XSHG"));
    assert_eq!(by_code.len(), 1);
    assert_eq!(by_code[0].order_id, first);
    assert_eq!(api.get_orders(&OrderQuery::all().with_status(OrderStatus::New)).len(), 2);
    assert!(api.get_orders(&OrderQuery::all().with_status(OrderStatus::Filled)).is_empty());
}

#[test]
fn test_setup_syncs_immediately_and_on_schedule() {
    let start = at(14, 59, 50);
    let clock = Arc::new(SimulatedClock::new(start));
    let event_loop = EventLoop::new(clock.clone());
    let bus = Rc::new(SchedulerBus::new());
    let scheduler = EventSourceScheduler::new(event_loop.handle(), bus.clone());
    let mut registry = EventClassRegistry::new();

    let gate = MockGate::default();
    let config = AccountConfig {
        sync_periods: vec![MarketPeriod {
            start: NaiveTime::from_hms_opt(14, 59, 55).unwrap(),
            end: NaiveTime::from_hms_opt(15, 0, 5).unwrap(),
        }],
        ..Default::default()
    };
    let account = Rc::new(RefCell::new(Account::new(config, Box::new(gate.clone()), clock)));
    Account::setup(&account, &scheduler, &mut registry, start, None).unwrap();

    assert_eq!(gate.state.borrow().setup_calls, 1);
    assert_eq!(gate.state.borrow().balance_calls, 1);
    assert_eq!(gate.state.borrow().order_calls, 1);
    assert!(account.borrow().sync_schedule().is_some());

    let class = registry.get(ACCOUNT_SYNC_CLASS).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let handle = event_loop.handle();
    bus.register(
        class,
        move |event: &Event| {
            log.borrow_mut().push(event.time);
            if log.borrow().len() == 3 {
                handle.stop();
            }
            Ok(())
        },
        -1,
    );

    event_loop.run().unwrap();

    assert_eq!(*seen.borrow(), vec![at(14, 59, 55), at(15, 0, 0), at(15, 0, 5)]);
    assert_eq!(gate.state.borrow().balance_calls, 4);
    assert_eq!(gate.state.borrow().order_calls, 4);
}

#[test]
fn test_no_scheduled_sync_after_end() {
    let start = at(14, 59, 50);
    let clock = Arc::new(SimulatedClock::new(start));
    let event_loop = EventLoop::new(clock.clone());
    let scheduler = EventSourceScheduler::new(event_loop.handle(), Rc::new(SchedulerBus::new()));
    let mut registry = EventClassRegistry::new();

    let gate = MockGate::default();
    let config = AccountConfig {
        sync_periods: vec![MarketPeriod {
            start: NaiveTime::from_hms_opt(14, 59, 55).unwrap(),
            end: NaiveTime::from_hms_opt(15, 0, 5).unwrap(),
        }],
        ..Default::default()
    };
    let account =
        Rc::new(RefCell::new(Account::new(config, Box::new(gate.clone()), clock.clone())));
    Account::setup(&account, &scheduler, &mut registry, start, Some(at(15, 0, 0))).unwrap();

    event_loop.run().unwrap();

    assert_eq!(gate.state.borrow().balance_calls, 3);
    assert_eq!(gate.state.borrow().order_calls, 3);
    assert_eq!(clock.now(), at(15, 0, 0));
}

#[test]
fn test_stale_cancel_after_fill_is_not_reported() {
    let gate = MockGate::default();
    let account = account_with(gate.clone(), at(10, 0, 0));
    let notices = Rc::new(RefCell::new(Vec::new()));
    let log = notices.clone();
    account.borrow_mut().add_observer(move |notice| log.borrow_mut().push(notice.kind));

    let id = account.borrow_mut().order("600000.XSHG", 200, OrderStyle::market(), OrderSide::Long);
    let mut filled = remote_with(&account.borrow(), &id, OrderStatus::Filled);
    filled.filled_amount = Some(200);
    gate.state.borrow_mut().remote_orders = vec![filled];
    account.borrow_mut().sync_orders();

    let mut canceled = remote_with(&account.borrow(), &id, OrderStatus::Canceled);
    canceled.filled_amount = Some(200);
    gate.state.borrow_mut().remote_orders = vec![canceled];
    account.borrow_mut().sync_orders();

    assert_eq!(*notices.borrow(), vec![NoticeKind::Deal]);
}

#[test]
fn test_setup_without_sync_schedules_nothing() {
    let clock = Arc::new(SimulatedClock::new(at(9, 0, 0)));
    let event_loop = EventLoop::new(clock.clone());
    let scheduler = EventSourceScheduler::new(event_loop.handle(), Rc::new(SchedulerBus::new()));
    let mut registry = EventClassRegistry::new();
    let config = AccountConfig { sync_balance: false, sync_order: false, ..Default::default() };
    let gate = MockGate::default();
    let account = Rc::new(RefCell::new(Account::new(config, Box::new(gate.clone()), clock)));

    Account::setup(&account, &scheduler, &mut registry, at(9, 0, 0), None).unwrap();

    assert_eq!(gate.state.borrow().setup_calls, 1);
    assert_eq!(gate.state.borrow().balance_calls, 0);
    assert_eq!(scheduler.schedule_count(), 0);
    assert!(registry.get(ACCOUNT_SYNC_CLASS).is_none());
}
