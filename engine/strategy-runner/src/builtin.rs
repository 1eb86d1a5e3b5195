//! Strategies compiled into the runner, selected by name on the command line

use crate::context::Context;
use crate::strategy::{Strategy, StrategyHost};
use std::rc::Rc;
use tracing::info;

/// Names accepted by `--strategy`
pub const BUILTIN_STRATEGIES: [&str; 2] = ["demo", "sync-only"];

pub fn builtin_strategy(name: &str) -> Option<Box<dyn Strategy>> {
    match name {
        "demo" => Some(Box::new(DemoStrategy)),
        "sync-only" => Some(Box::new(SyncOnlyStrategy)),
        _ => None,
    }
}

/// Logs market milestones and the portfolio at open and close
pub struct DemoStrategy;

impl Strategy for DemoStrategy {
    fn process_initialize(
        &mut self,
        host: &StrategyHost,
        ctx: &Rc<Context>,
    ) -> anyhow::Result<()> {
        info!("Demo strategy initializing for task {}", ctx.task_name());

        host.run_daily("before_open", "before_open", |ctx| {
            info!("Before open at {}", ctx.strategy_time());
            Ok(())
        })?;
        host.run_daily("market_open", "open", |ctx| {
            log_portfolio("Market open", ctx);
            Ok(())
        })?;
        host.run_daily("market_close", "close", |ctx| {
            log_portfolio("Market close", ctx);
            Ok(())
        })?;
        Ok(())
    }

    fn process_exit(&mut self, ctx: &Rc<Context>) -> anyhow::Result<()> {
        info!("Demo strategy exiting at {}", ctx.current_time());
        Ok(())
    }
}

/// Schedules nothing; the process only keeps the account in sync
pub struct SyncOnlyStrategy;

impl Strategy for SyncOnlyStrategy {
    fn process_initialize(
        &mut self,
        _host: &StrategyHost,
        ctx: &Rc<Context>,
    ) -> anyhow::Result<()> {
        info!("Sync-only task {} started at {}", ctx.task_name(), ctx.start());
        Ok(())
    }
}

fn log_portfolio(label: &str, ctx: &Context) {
    match ctx.portfolio() {
        Ok(portfolio) => info!(
            "{} at {}: total_asset={} available_cash={} positions={}",
            label,
            ctx.strategy_time(),
            portfolio.total_asset,
            portfolio.available_cash,
            portfolio.long_positions.len() + portfolio.short_positions.len()
        ),
        Err(_) => info!("{} at {}", label, ctx.strategy_time()),
    }
}
