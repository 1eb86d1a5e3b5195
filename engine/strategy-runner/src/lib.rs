//! Strategy Runner Library
//!
//! Process glue around the scheduler and the trade account: command line, layered
//! configuration, logging, the OS signal bridge, the context handed to strategies,
//! the strategy host and the task runner.

pub mod builtin;
pub mod cli;
pub mod config;
pub mod context;
pub mod logging;
pub mod runner;
pub mod signals;
pub mod strategy;


pub use builtin::{builtin_strategy, BUILTIN_STRATEGIES};
pub use cli::Cli;
pub use config::{LoggingConfig, RunnerConfig, TaskSettings};
pub use context::Context;
pub use logging::{initialize_logging, LoggingGuard};
pub use runner::{TaskOutcome, TaskRunner};
pub use signals::{setup_signal_handlers, SignalBridge};
pub use strategy::{DailyCallback, Strategy, StrategyHost, StrategyOptions};
