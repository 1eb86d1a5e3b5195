//! Explicit per-process context handed to strategy callbacks

use chrono::NaiveDateTime;
use std::cell::RefCell;
use std::rc::Rc;
use strategy_scheduler::{EventSourceScheduler, LoopHandle, SchedulerBus};
use trade_account::{Portfolio, TradingApi, UserError};

/// Everything a strategy may reach while the loop runs
pub struct Context {
    task_name: String,
    handle: LoopHandle,
    scheduler: EventSourceScheduler,
    start: NaiveDateTime,
    end: Option<NaiveDateTime>,
    debug: bool,
    trading: RefCell<Option<TradingApi>>,
}

impl Context {
    pub fn new(
        task_name: impl Into<String>,
        scheduler: EventSourceScheduler,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
        debug: bool,
    ) -> Rc<Self> {
        Rc::new(Self {
            task_name: task_name.into(),
            handle: scheduler.handle(),
            scheduler,
            start,
            end,
            debug,
            trading: RefCell::new(None),
        })
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn loop_handle(&self) -> &LoopHandle {
        &self.handle
    }

    pub fn scheduler(&self) -> &EventSourceScheduler {
        &self.scheduler
    }

    pub fn bus(&self) -> Rc<SchedulerBus> {
        self.scheduler.bus()
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        self.end
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Wall-clock time
    pub fn current_time(&self) -> NaiveDateTime {
        self.handle.now()
    }

    /// Due time of the event being handled; wall time outside any callback
    pub fn strategy_time(&self) -> NaiveDateTime {
        self.handle.strategy_time().unwrap_or_else(|| self.handle.now())
    }

    pub(crate) fn attach_trading(&self, api: TradingApi) {
        *self.trading.borrow_mut() = Some(api);
    }

    pub fn has_account(&self) -> bool {
        self.trading.borrow().is_some()
    }

    /// Order API; fails when the task runs without an account
    pub fn trading(&self) -> Result<TradingApi, UserError> {
        self.trading
            .borrow()
            .clone()
            .ok_or_else(|| UserError::invalid_call("this task runs without a trading account"))
    }

    pub fn portfolio(&self) -> Result<Portfolio, UserError> {
        Ok(self.trading()?.portfolio())
    }
}
