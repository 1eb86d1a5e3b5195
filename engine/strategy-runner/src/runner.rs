//! Task runner: wires configuration, loop, strategy and account together

use crate::builtin::{builtin_strategy, BUILTIN_STRATEGIES};
use crate::cli::Cli;
use crate::config::RunnerConfig;
use crate::context::Context;
use crate::logging::initialize_logging;
use crate::signals::setup_signal_handlers;
use crate::strategy::{Strategy, StrategyHost};
use anyhow::{anyhow, Context as _, Result};
use chrono::NaiveDateTime;
use file_gate::FileTradeGate;
use fs2::FileExt;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use strategy_scheduler::{
    to_millis, Clock, EventClassRegistry, EventLoop, EventSourceScheduler, LoopMetricsSnapshot,
    SchedulerBus, SystemClock,
};
use tracing::{error, info, warn};
use trade_account::{Account, TradingApi};

/// What a finished task reports back to the entry point
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub metrics: LoopMetricsSnapshot,
    pub account_attached: bool,
}

pub struct TaskRunner {
    cli: Cli,
}

impl TaskRunner {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Load configuration, set up logging and run the task on the wall clock
    pub fn run(self) -> Result<TaskOutcome> {
        let mut config = RunnerConfig::load(self.cli.config.as_deref())?;
        if self.cli.debug {
            config.logging.level = "debug".to_string();
        }
        let _logging = initialize_logging(&config.logging, self.cli.out.as_deref())?;

        info!(
            "Starting task {} (strategy {}, config {:?}, log file {:?}, debug {})",
            self.cli.name, self.cli.strategy, self.cli.config, self.cli.out, self.cli.debug
        );

        std::fs::create_dir_all(&config.task.runtime_dir).with_context(|| {
            format!("Failed to create runtime directory {:?}", config.task.runtime_dir)
        })?;
        let _task_lock = acquire_task_lock(&config.task.runtime_dir, &self.cli.name)?;

        let strategy = resolve_strategy(&self.cli.strategy)?;
        let outcome = self.execute(config, strategy, Arc::new(SystemClock::new()), true)?;
        info!("Task {} finished: {:?}", self.cli.name, outcome.metrics);
        Ok(outcome)
    }

    /// Build the loop and everything around it, then run until the loop stops
    pub fn execute(
        &self,
        config: RunnerConfig,
        mut strategy: Box<dyn Strategy>,
        clock: Arc<dyn Clock>,
        install_signals: bool,
    ) -> Result<TaskOutcome> {
        config.validate()?;
        let now = clock.now();
        let start = resolve_start(self.cli.start, now, config.scheduler.enable_history_start);
        let end = self.cli.end;
        if let Some(end) = end {
            if end < start {
                return Err(anyhow!("End time {} is before start time {}", end, start));
            }
        }

        let event_loop = EventLoop::new(clock.clone());
        let handle = event_loop.handle();
        let bus = Rc::new(SchedulerBus::new());
        let scheduler = EventSourceScheduler::new(handle.clone(), bus);
        let mut registry = EventClassRegistry::new();
        if let Some(end) = end {
            let end_ms = to_millis(end);
            handle.register_exit_checker(move |_, next_due| next_due > end_ms);
        }

        let ctx =
            Context::new(self.cli.name.clone(), scheduler.clone(), start, end, self.cli.debug);
        let host = StrategyHost::new(config.scheduler.clone(), config.task.setup_account);
        host.setup(strategy.as_mut(), &ctx, &mut registry)
            .context("Strategy initialization failed")?;

        if config.task.setup_account {
            let mut gate_config = config.gate_config();
            if let Some(options) = host.options() {
                gate_config.account_no = options.account_no;
                if let Some(account_type) = options.account_type {
                    gate_config.account_type = account_type;
                }
            }
            let gate = FileTradeGate::new(gate_config, clock.clone());
            let account = Rc::new(RefCell::new(Account::new(
                config.account.clone(),
                Box::new(gate),
                clock.clone(),
            )));
            Account::setup(&account, &scheduler, &mut registry, start, end)
                .context("Account setup failed")?;
            ctx.attach_trading(TradingApi::new(account));
        } else {
            info!("Running without a trading account");
        }

        let bridge = if install_signals {
            Some(setup_signal_handlers(event_loop.notifier())?)
        } else {
            None
        };

        info!("Event loop starting at {} with {} schedules", start, scheduler.schedule_count());
        let result = event_loop.run();

        if let Err(e) = strategy.process_exit(&ctx) {
            error!("process_exit failed: {:#}", e);
        }
        if let Some(bridge) = bridge {
            bridge.close();
        }

        result.context("Event loop stopped on a callback failure")?;
        Ok(TaskOutcome {
            metrics: event_loop.notifier().metrics(),
            account_attached: ctx.has_account(),
        })
    }
}

pub fn resolve_strategy(name: &str) -> Result<Box<dyn Strategy>> {
    builtin_strategy(name).ok_or_else(|| {
        anyhow!("Unknown strategy '{}', expected one of {:?}", name, BUILTIN_STRATEGIES)
    })
}

/// A start in the past is honoured only when history starts are enabled
pub fn resolve_start(
    requested: Option<NaiveDateTime>,
    now: NaiveDateTime,
    enable_history_start: bool,
) -> NaiveDateTime {
    match requested {
        Some(start) if start < now && !enable_history_start => {
            warn!("Start {} is in the past and history starts are disabled, using now", start);
            now
        }
        Some(start) => start,
        None => now,
    }
}

/// Hold an exclusive lock on `<runtime_dir>/<task>.lock` for the life of the task
pub fn acquire_task_lock(runtime_dir: &Path, task_name: &str) -> Result<File> {
    let path = runtime_dir.join(format!("{}.lock", task_name));
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .with_context(|| format!("Failed to open task lock {}", path.display()))?;
    file.try_lock_exclusive()
        .map_err(|_| anyhow!("Task '{}' is already running on this machine", task_name))?;
    Ok(file)
}
