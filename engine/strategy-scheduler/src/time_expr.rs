//! Time expressions for daily rules
//!
//! Two forms are accepted:
//! - absolute wall time, `HH:MM` or `HH:MM:SS`
//! - a market anchor with an optional signed compound offset, e.g. `open`,
//!   `close-30m`, `open+1h30m`, `close+1h2m3s`; each unit takes one or two digits
//!   and appears at most once

use crate::config::MarketSession;
use crate::error::{Result, SchedulerError};
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;
use std::str::FromStr;

/// Named reference time resolved against the market session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    Open,
    Close,
}

/// Parsed time expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeExpr {
    Absolute(NaiveTime),
    Relative { anchor: Anchor, offset_secs: i64 },
}

impl TimeExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();
        if trimmed.contains(':') {
            return NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
                .map(TimeExpr::Absolute)
                .map_err(|_| SchedulerError::time_expression(format!("bad wall time '{}'", expr)));
        }

        let lowered = trimmed.to_ascii_lowercase();
        let (anchor, rest) = if let Some(rest) = lowered.strip_prefix("open") {
            (Anchor::Open, rest)
        } else if let Some(rest) = lowered.strip_prefix("close") {
            (Anchor::Close, rest)
        } else {
            return Err(SchedulerError::time_expression(format!(
                "'{}' is neither HH:MM[:SS] nor relative to open/close",
                expr
            )));
        };

        let offset_secs = match rest.chars().next() {
            None => 0,
            Some('+') => parse_offset(&rest[1..]).ok_or_else(|| bad_offset(expr))?,
            Some('-') => -parse_offset(&rest[1..]).ok_or_else(|| bad_offset(expr))?,
            Some(_) => return Err(bad_offset(expr)),
        };

        Ok(TimeExpr::Relative { anchor, offset_secs })
    }

    /// Concrete timestamp of this expression on `date`
    pub fn resolve(&self, date: NaiveDate, session: &MarketSession) -> NaiveDateTime {
        match self {
            TimeExpr::Absolute(time) => date.and_time(*time),
            TimeExpr::Relative { anchor, offset_secs } => {
                let base = match anchor {
                    Anchor::Open => session.open,
                    Anchor::Close => session.close,
                };
                date.and_time(base) + chrono::Duration::seconds(*offset_secs)
            }
        }
    }

    /// Whole days between the date an expression is resolved for and the date it lands on
    pub fn day_shift(&self, session: &MarketSession) -> i64 {
        match self {
            TimeExpr::Absolute(_) => 0,
            TimeExpr::Relative { anchor, offset_secs } => {
                let base = match anchor {
                    Anchor::Open => session.open,
                    Anchor::Close => session.close,
                };
                (i64::from(base.num_seconds_from_midnight()) + offset_secs).div_euclid(86_400)
            }
        }
    }

    /// The one occurrence of this expression that falls on calendar day `day`
    pub fn resolve_landing_on(
        &self,
        day: NaiveDate,
        session: &MarketSession,
    ) -> Option<NaiveDateTime> {
        let shift = self.day_shift(session);
        let days = Days::new(shift.unsigned_abs());
        let source =
            if shift >= 0 { day.checked_sub_days(days) } else { day.checked_add_days(days) };
        source.map(|source| self.resolve(source, session))
    }
}

impl FromStr for TimeExpr {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        TimeExpr::parse(s)
    }
}

impl fmt::Display for TimeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeExpr::Absolute(time) => write!(f, "{}", time.format("%H:%M:%S")),
            TimeExpr::Relative { anchor, offset_secs } => {
                let name = match anchor {
                    Anchor::Open => "open",
                    Anchor::Close => "close",
                };
                f.write_str(name)?;
                if *offset_secs == 0 {
                    return Ok(());
                }

                let abs = offset_secs.abs();
                f.write_str(if *offset_secs < 0 { "-" } else { "+" })?;
                for (value, unit) in [(abs / 3600, 'h'), (abs % 3600 / 60, 'm'), (abs % 60, 's')] {
                    if value > 0 {
                        write!(f, "{}{}", value, unit)?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn bad_offset(expr: &str) -> SchedulerError {
    SchedulerError::time_expression(format!("bad offset in '{}', expected e.g. close-30m", expr))
}

/// Parse `([0-9]{1,2}[hms]){1,3}` into seconds
fn parse_offset(text: &str) -> Option<i64> {
    let mut total = 0i64;
    let mut seen = [false; 3];
    let mut groups = 0;
    let mut digits = String::new();

    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() > 2 {
                return None;
            }
            continue;
        }

        let (slot, unit) = match ch {
            'h' => (0, 3600),
            'm' => (1, 60),
            's' => (2, 1),
            _ => return None,
        };
        if digits.is_empty() || seen[slot] {
            return None;
        }
        seen[slot] = true;
        total += digits.parse::<i64>().ok()? * unit;
        digits.clear();
        groups += 1;
    }

    if groups == 0 || !digits.is_empty() {
        return None;
    }
    Some(total)
}
