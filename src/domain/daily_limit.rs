use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::MinorUnits;

/// Length of the window a wallet's spend cap applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitPeriod {
    /// Resets at UTC midnight.
    #[default]
    CalendarDay,
    /// Resets once the given duration has elapsed since the window opened.
    Rolling(Duration),
}

impl LimitPeriod {
    /// Start of the window that contains `now`.
    pub fn start_of(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            LimitPeriod::CalendarDay => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc())
                .unwrap_or(now),
            LimitPeriod::Rolling(_) => now,
        }
    }

    /// First instant after the window opened at `start`.
    pub fn end_of(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            LimitPeriod::CalendarDay => start + Duration::days(1),
            LimitPeriod::Rolling(length) => start + *length,
        }
    }
}

impl FromStr for LimitPeriod {
    type Err = String;

    /// Accepts `calendar-day` or `rolling:<hours>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "calendar-day" {
            return Ok(LimitPeriod::CalendarDay);
        }
        match s.strip_prefix("rolling:") {
            Some(hours) => {
                let hours: i64 = hours
                    .parse()
                    .map_err(|_| format!("invalid rolling period hours: {hours}"))?;
                if hours <= 0 {
                    return Err("rolling period must be at least one hour".to_string());
                }
                Ok(LimitPeriod::Rolling(Duration::hours(hours)))
            }
            None => Err(format!(
                "invalid limit period '{s}' (expected calendar-day or rolling:<hours>)"
            )),
        }
    }
}

impl std::fmt::Display for LimitPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitPeriod::CalendarDay => write!(f, "calendar-day"),
            LimitPeriod::Rolling(length) => write!(f, "rolling:{}", length.num_hours()),
        }
    }
}

/// Outcome of checking a spend against a wallet's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Allowed,
    Denied { remaining: MinorUnits },
}

/// Spend accumulated against a wallet's cap within one limit period.
/// Invariant: `0 <= spent <= limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendWindow {
    pub limit: MinorUnits,
    pub spent: MinorUnits,
    pub period_start: DateTime<Utc>,
}

impl SpendWindow {
    pub fn new(limit: MinorUnits, period_start: DateTime<Utc>) -> Self {
        Self {
            limit,
            spent: 0,
            period_start,
        }
    }

    /// Reset the accumulator if `now` is past the end of the current window.
    /// Pure function of `now`: nothing resets windows in the background.
    pub fn rolled(self, now: DateTime<Utc>, period: LimitPeriod) -> Self {
        if now >= period.end_of(self.period_start) {
            Self {
                limit: self.limit,
                spent: 0,
                period_start: period.start_of(now),
            }
        } else {
            self
        }
    }

    pub fn remaining(&self) -> MinorUnits {
        self.limit.saturating_sub(self.spent).max(0)
    }

    pub fn authorize(&self, amount: MinorUnits) -> Authorization {
        match self.spent.checked_add(amount) {
            Some(total) if total <= self.limit => Authorization::Allowed,
            _ => Authorization::Denied {
                remaining: self.remaining(),
            },
        }
    }

    /// Record an authorized spend.
    pub fn record(&mut self, amount: MinorUnits) {
        self.spent = self.spent.saturating_add(amount);
    }
}
