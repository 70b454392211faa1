//! Clock injection.
//!
//! Loan dates are civil dates; the coordinator never reads ambient time
//! directly. Injecting the clock keeps fine computation and the overdue sweep
//! deterministic under test.

use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};

/// Source of the current date.
pub trait Clock: Send + Sync + core::fmt::Debug {
    /// Current civil date.
    fn today(&self) -> NaiveDate;

    /// Current instant (business-time metadata on events).
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used outside of tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for deterministic tests.
#[derive(Debug)]
pub struct FixedClock {
    today: RwLock<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: RwLock::new(today),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        *self.today.write().unwrap_or_else(|e| e.into_inner()) = today;
    }

    pub fn advance_days(&self, days: i64) {
        let mut guard = self.today.write().unwrap_or_else(|e| e.into_inner());
        *guard += chrono::Duration::days(days);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.today.read().unwrap_or_else(|e| e.into_inner())
    }

    fn now(&self) -> DateTime<Utc> {
        self.today()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc()
    }
}
