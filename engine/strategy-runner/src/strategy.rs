//! Strategy boundary and the host that turns its daily rules into scheduled events

use crate::context::Context;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use strategy_scheduler::{EventClassRegistry, EventKind, EventSource, SchedulerConfig, TimeExpr};
use tracing::{debug, info, warn};
use trade_account::UserError;

/// Callback run on each occurrence of a daily rule
pub type DailyCallback = Rc<dyn Fn(&Context) -> anyhow::Result<()>>;

/// Time aliases accepted by [`StrategyHost::run_daily`]
pub const TIME_ALIASES: [(&str, &str); 4] = [
    ("open", "open+0m"),
    ("close", "close+0m"),
    ("before_open", "open-30m"),
    ("after_close", "close+30m"),
];

/// Expands to one rule per minute of every market period
pub const EVERY_MINUTE: &str = "every_minute";

/// User strategy code.
///
/// `process_initialize` runs once before the loop starts and is the only place where
/// daily rules and options may be set. `process_exit` runs after the loop stops.
pub trait Strategy {
    fn process_initialize(
        &mut self,
        host: &StrategyHost,
        ctx: &Rc<Context>,
    ) -> anyhow::Result<()>;

    fn process_exit(&mut self, _ctx: &Rc<Context>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Account options a strategy may set during initialisation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyOptions {
    pub account_no: String,
    pub account_type: Option<String>,
}

impl StrategyOptions {
    pub fn new(account_no: impl Into<String>) -> Self {
        Self { account_no: account_no.into(), account_type: None }
    }

    pub fn with_account_type(mut self, account_type: impl Into<String>) -> Self {
        self.account_type = Some(account_type.into());
        self
    }
}

struct DailySchedule {
    name: String,
    time: String,
    callback: DailyCallback,
}

struct HostInner {
    config: SchedulerConfig,
    setup_account: bool,
    initializing: Cell<bool>,
    schedules: RefCell<Vec<DailySchedule>>,
    options: RefCell<Option<StrategyOptions>>,
    schedule_count: Cell<usize>,
}

/// Collects daily rules during initialisation and schedules them afterwards
#[derive(Clone)]
pub struct StrategyHost {
    inner: Rc<HostInner>,
}

impl StrategyHost {
    pub fn new(config: SchedulerConfig, setup_account: bool) -> Self {
        Self {
            inner: Rc::new(HostInner {
                config,
                setup_account,
                initializing: Cell::new(false),
                schedules: RefCell::new(Vec::new()),
                options: RefCell::new(None),
                schedule_count: Cell::new(0),
            }),
        }
    }

    /// Run `callback` every trading day at `time`.
    ///
    /// `time` is an absolute `HH:MM[:SS]`, an anchor expression such as `close-30s`, one
    /// of the aliases `open`, `close`, `before_open`, `after_close`, or `every_minute`.
    pub fn run_daily<F>(&self, name: &str, time: &str, callback: F) -> Result<(), UserError>
    where
        F: Fn(&Context) -> anyhow::Result<()> + 'static,
    {
        debug!("run_daily called for {} at {}", name, time);
        if !self.inner.initializing.get() {
            return Err(UserError::invalid_call(
                "run_daily is only valid inside process_initialize",
            ));
        }
        if name.trim().is_empty() {
            return Err(UserError::invalid_param("callback name must not be empty"));
        }

        let time = resolve_alias(time);
        if time != EVERY_MINUTE {
            TimeExpr::parse(time).map_err(|e| UserError::invalid_param(e.to_string()))?;
        }

        self.inner.schedules.borrow_mut().push(DailySchedule {
            name: name.to_string(),
            time: time.to_string(),
            callback: Rc::new(callback),
        });
        Ok(())
    }

    /// Set account options; only valid inside process_initialize
    pub fn set_options(&self, options: StrategyOptions) -> Result<(), UserError> {
        if !self.inner.initializing.get() {
            return Err(UserError::invalid_call(
                "set_options is only valid inside process_initialize",
            ));
        }
        if !self.inner.setup_account {
            warn!("Task runs without an account, ignoring set_options");
            return Ok(());
        }
        if options.account_no.trim().is_empty() {
            return Err(UserError::invalid_param("set_options requires account_no"));
        }
        *self.inner.options.borrow_mut() = Some(options);
        Ok(())
    }

    pub fn options(&self) -> Option<StrategyOptions> {
        self.inner.options.borrow().clone()
    }

    pub fn pending_schedules(&self) -> usize {
        self.inner.schedules.borrow().len()
    }

    /// Run `process_initialize`, then schedule every rule it collected
    pub fn setup(
        &self,
        strategy: &mut dyn Strategy,
        ctx: &Rc<Context>,
        registry: &mut EventClassRegistry,
    ) -> anyhow::Result<()> {
        self.inner.initializing.set(true);
        let initialized = strategy.process_initialize(self, ctx);
        self.inner.initializing.set(false);
        initialized?;

        self.schedule(ctx, registry)
    }

    fn schedule(&self, ctx: &Rc<Context>, registry: &mut EventClassRegistry) -> anyhow::Result<()> {
        let schedules: Vec<DailySchedule> = self.inner.schedules.borrow_mut().drain(..).collect();
        for desc in schedules {
            let count = self.inner.schedule_count.get();
            self.inner.schedule_count.set(count + 1);
            let class_name = format!("Scheduler_{}_{}", desc.name, count);
            info!("Scheduling daily task {} at {} as {}", desc.name, desc.time, class_name);

            let mut source = EventSource::from_config(&self.inner.config, ctx.start())?
                .with_end(ctx.end());
            let class = if desc.time == EVERY_MINUTE {
                let class = registry.get_or_create(&class_name, EventKind::EveryMinute);
                for period in &self.inner.config.market_periods {
                    for minute in period.minutes() {
                        source.daily_expr(class, TimeExpr::Absolute(minute));
                    }
                }
                class
            } else {
                let class = registry.get_or_create(&class_name, EventKind::Daily);
                source.daily(class, &desc.time)?;
                class
            };

            let callback = desc.callback;
            let callback_ctx = Rc::clone(ctx);
            ctx.bus().register(class, move |_| callback(&callback_ctx), 0);
            ctx.scheduler().schedule(Rc::new(RefCell::new(source)));
        }
        Ok(())
    }
}

fn resolve_alias(time: &str) -> &str {
    TIME_ALIASES.iter().find(|(alias, _)| *alias == time).map_or(time, |(_, expr)| *expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!(resolve_alias("before_open"), "open-30m");
        assert_eq!(resolve_alias("after_close"), "close+30m");
        assert_eq!(resolve_alias("open"), "open+0m");
        assert_eq!(resolve_alias("14:55"), "14:55");
    }

    #[test]
    fn test_calls_outside_initialisation_are_invalid() {
        let host = StrategyHost::new(SchedulerConfig::default(), true);
        let err = host.run_daily("handle", "open", |_| Ok(())).unwrap_err();
        assert!(matches!(err, UserError::InvalidCall(_)));
        let err = host.set_options(StrategyOptions::new("10001")).unwrap_err();
        assert!(matches!(err, UserError::InvalidCall(_)));
        assert_eq!(host.pending_schedules(), 0);
    }
}
