//! Configuration for the scheduler

use crate::error::{Result, SchedulerError};
use crate::DEFAULT_EVENT_DAYS_COUNT;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One continuous trading session within a day, bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPeriod {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl MarketPeriod {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Every whole minute from `start` to `end`, both included
    pub fn minutes(&self) -> Vec<NaiveTime> {
        let mut minutes = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            minutes.push(current);
            let (next, wrapped) = current.overflowing_add_signed(chrono::Duration::minutes(1));
            if wrapped != 0 {
                break;
            }
            current = next;
        }
        minutes
    }
}

/// Market anchors of a trading day: first session open and last session close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSession {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl MarketSession {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }
}

impl Default for MarketSession {
    fn default() -> Self {
        let periods = default_market_periods();
        Self { open: periods[0].start, close: periods[periods.len() - 1].end }
    }
}

/// Configuration for event generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Trading sessions of a day in chronological order
    pub market_periods: Vec<MarketPeriod>,

    /// How many calendar days an event source looks ahead before it stops generating
    pub event_days_count: u32,

    /// Honour a start time in the past instead of clamping it to now
    pub enable_history_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            market_periods: default_market_periods(),
            event_days_count: DEFAULT_EVENT_DAYS_COUNT,
            enable_history_start: false,
        }
    }
}

impl SchedulerConfig {
    /// Market anchors derived from the configured periods
    pub fn session(&self) -> Result<MarketSession> {
        match (self.market_periods.first(), self.market_periods.last()) {
            (Some(first), Some(last)) => Ok(MarketSession::new(first.start, last.end)),
            _ => Err(SchedulerError::config("market_periods must not be empty")),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.market_periods.is_empty() {
            return Err(SchedulerError::config("market_periods must not be empty"));
        }
        for period in &self.market_periods {
            if period.start > period.end {
                return Err(SchedulerError::config(format!(
                    "market period {}-{} ends before it starts",
                    period.start, period.end
                )));
            }
        }
        for pair in self.market_periods.windows(2) {
            if pair[0].end > pair[1].start {
                return Err(SchedulerError::config("market periods overlap or are out of order"));
            }
        }
        if self.event_days_count == 0 {
            return Err(SchedulerError::config("event_days_count must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SchedulerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Morning and afternoon continuous auction sessions
pub fn default_market_periods() -> Vec<MarketPeriod> {
    vec![MarketPeriod::new(hm(9, 30), hm(11, 30)), MarketPeriod::new(hm(13, 0), hm(15, 0))]
}
