//! Runner configuration management
//!
//! Layers, later ones winning: built-in defaults, an optional TOML file, then
//! `STRATEGY_*` environment variables with `__` between nested keys
//! (`STRATEGY_LOGGING__LEVEL=debug`, `STRATEGY_FILE_GATE__ACCOUNT_NO=10001`).

use anyhow::{anyhow, Context, Result};
use file_gate::FileGateConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strategy_scheduler::SchedulerConfig;
use trade_account::AccountConfig;

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "STRATEGY";

/// Main runner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Task-level settings
    pub task: TaskSettings,

    /// Event generation and market sessions
    pub scheduler: SchedulerConfig,

    /// Account synchronisation
    pub account: AccountConfig,

    /// Broker file protocol
    pub file_gate: FileGateConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Task-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    /// Build the broker account and its sync timer
    pub setup_account: bool,

    /// Directory for task locks and relative gate state
    pub runtime_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,

    /// Log file path (if None, logs to stdout)
    pub file: Option<PathBuf>,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self { setup_account: true, runtime_dir: PathBuf::from("./runtime") }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string(), file: None }
    }
}

impl RunnerConfig {
    /// Load defaults, then `path` if given, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(anyhow!("Configuration file not found: {}", path.display()));
            }
            tracing::debug!("Loading configuration from file: {:?}", path);
            builder = builder
                .add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX).prefix_separator("_").separator("__"),
        );

        let config: RunnerConfig = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate().context("Invalid scheduler configuration")?;
        self.account.validate().context("Invalid account configuration")?;
        if self.task.setup_account {
            self.file_gate.validate().context("Invalid file gate configuration")?;
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(anyhow!("Invalid log level: {}", self.logging.level)),
        }
        match self.logging.format.as_str() {
            "json" | "pretty" | "compact" => {}
            _ => return Err(anyhow!("Invalid log format: {}", self.logging.format)),
        }
        Ok(())
    }

    /// Gate configuration with a relative state directory placed under the runtime dir
    pub fn gate_config(&self) -> FileGateConfig {
        let mut gate = self.file_gate.clone();
        if gate.state_dir.is_relative() {
            gate.state_dir = self.task.runtime_dir.join(&gate.state_dir);
        }
        gate
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
        Ok(())
    }
}
