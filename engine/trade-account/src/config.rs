//! Configuration for account synchronisation

use crate::error::{AccountError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strategy_scheduler::MarketPeriod;

/// How and when the account pulls broker state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Pull cash and positions periodically
    pub sync_balance: bool,

    /// Pull order status periodically
    pub sync_order: bool,

    /// Seconds between two syncs
    pub sync_interval_secs: u64,

    /// Windows in which syncs run; empty means all day
    pub sync_periods: Vec<MarketPeriod>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            sync_balance: true,
            sync_order: true,
            sync_interval_secs: 5,
            sync_periods: Vec::new(),
        }
    }
}

impl AccountConfig {
    /// Get sync interval as Duration
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Whether any periodic sync is enabled
    pub fn sync_enabled(&self) -> bool {
        self.sync_balance || self.sync_order
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_enabled() && self.sync_interval_secs == 0 {
            return Err(AccountError::config("sync_interval_secs must be positive"));
        }
        if self.sync_periods.iter().any(|period| period.start > period.end) {
            return Err(AccountError::config("sync period ends before it starts"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn test_defaults() {
        let config = AccountConfig::default();
        assert!(config.sync_balance && config.sync_order);
        assert_eq!(config.sync_interval(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected_only_when_syncing() {
        let mut config = AccountConfig { sync_interval_secs: 0, ..Default::default() };
        assert!(config.validate().is_err());
        config.sync_balance = false;
        config.sync_order = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_period_rejected() {
        let config = AccountConfig {
            sync_periods: vec![MarketPeriod::new(
                NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            )],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
