//! Per-provider request caps.
//!
//! Fixed windows: the current UTC minute and the current UTC date. A request
//! that would exceed either cap is refused before anything is sent.

use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rv_config::BudgetConfig;

use crate::provider::ProviderError;

#[derive(Debug, Default)]
struct Counters {
    minute: i64,
    minute_count: u32,
    day: Option<NaiveDate>,
    day_count: u32,
}

#[derive(Debug)]
pub struct RequestBudget {
    name: String,
    per_minute: Option<u32>,
    per_day: Option<u32>,
    counters: Mutex<Counters>,
}

impl RequestBudget {
    pub fn new(name: impl Into<String>, cfg: BudgetConfig) -> Self {
        Self {
            name: name.into(),
            per_minute: cfg.per_minute,
            per_day: cfg.per_day,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reserve one request at `now`. Counts only when both caps allow it.
    pub fn try_acquire(&self, now: DateTime<Utc>) -> Result<(), ProviderError> {
        let mut c = self
            .counters
            .lock()
            .map_err(|_| ProviderError::Transport(format!("budget {} lock poisoned", self.name)))?;

        let minute = now.timestamp().div_euclid(60);
        if c.minute != minute {
            c.minute = minute;
            c.minute_count = 0;
        }
        let day = now.date_naive();
        if c.day != Some(day) {
            c.day = Some(day);
            c.day_count = 0;
        }

        if let Some(cap) = self.per_day {
            if c.day_count >= cap {
                return Err(ProviderError::BudgetExhausted {
                    budget: self.name.clone(),
                    window: "day",
                });
            }
        }
        if let Some(cap) = self.per_minute {
            if c.minute_count >= cap {
                return Err(ProviderError::BudgetExhausted {
                    budget: self.name.clone(),
                    window: "minute",
                });
            }
        }

        c.minute_count += 1;
        c.day_count += 1;
        Ok(())
    }
}
