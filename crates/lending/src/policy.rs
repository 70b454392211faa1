//! Lending policy constants.

use serde::{Deserialize, Serialize};

/// Configuration for the lending coordinator.
///
/// Defaults mirror the library's standing rules; tests override them through
/// the builder methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LendingPolicy {
    /// Cap on loans with status borrowed/overdue per patron.
    pub max_active_loans: u32,
    /// Loan duration applied when the borrower does not pick a due date.
    pub default_loan_days: i64,
    /// Late fee per day past the due date.
    pub fine_per_day: f64,
    /// Flat fee charged when a copy is marked lost.
    ///
    /// A flat constant, not the item's replacement cost.
    pub lost_copy_fine: f64,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            max_active_loans: 5,
            default_loan_days: 14,
            fine_per_day: 1.0,
            lost_copy_fine: 50.0,
        }
    }
}

impl LendingPolicy {
    pub fn with_max_active_loans(mut self, max: u32) -> Self {
        self.max_active_loans = max;
        self
    }

    pub fn with_default_loan_days(mut self, days: i64) -> Self {
        self.default_loan_days = days;
        self
    }

    pub fn with_fine_per_day(mut self, fine: f64) -> Self {
        self.fine_per_day = fine;
        self
    }

    pub fn with_lost_copy_fine(mut self, fine: f64) -> Self {
        self.lost_copy_fine = fine;
        self
    }
}
