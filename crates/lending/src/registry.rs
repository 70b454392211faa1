//! Registry queries over loan sets.
//!
//! Pure predicate functions over a point-in-time snapshot of loans; the store
//! supplies the slice. Uniqueness and borrow-limit checks in the coordinator
//! are built on these, with record-version CAS closing the races a snapshot
//! check alone cannot.

use chrono::NaiveDate;

use circulate_core::{ItemId, PatronId};

use crate::loan::{Loan, LoanStatus};

/// The one active loan (borrowed or overdue) for a (patron, item) pair, if any.
///
/// The invariant that at most one such loan exists is enforced at borrow time;
/// this lookup still returns the first match defensively.
pub fn active_loan_for(loans: &[Loan], patron_id: PatronId, item_id: ItemId) -> Option<&Loan> {
    loans.iter().find(|loan| {
        loan.is_active() && loan.patron_id() == Some(patron_id) && loan.item_id() == Some(item_id)
    })
}

/// Number of active loans held by a patron (the borrow-limit input).
pub fn count_active(loans: &[Loan], patron_id: PatronId) -> usize {
    loans
        .iter()
        .filter(|loan| loan.is_active() && loan.patron_id() == Some(patron_id))
        .count()
}

/// All BORROWED loans strictly past their due date as of `as_of`.
///
/// Loans already flipped to OVERDUE are excluded: this feeds the sweep, which
/// only needs the not-yet-flipped ones.
pub fn overdue_as_of(loans: &[Loan], as_of: NaiveDate) -> Vec<&Loan> {
    loans
        .iter()
        .filter(|loan| loan.status() == LoanStatus::Borrowed && loan.due_date() < as_of)
        .collect()
}

/// All BORROWED loans whose due date falls within `[as_of, as_of + days]`.
pub fn due_within(loans: &[Loan], as_of: NaiveDate, days: i64) -> Vec<&Loan> {
    let end = as_of + chrono::Duration::days(days);
    loans
        .iter()
        .filter(|loan| {
            loan.status() == LoanStatus::Borrowed
                && loan.due_date() >= as_of
                && loan.due_date() <= end
        })
        .collect()
}

/// Days an active loan is past due as of `as_of`; zero if not past due or not
/// active.
pub fn days_overdue(loan: &Loan, as_of: NaiveDate) -> i64 {
    if loan.is_active() && as_of > loan.due_date() {
        (as_of - loan.due_date()).num_days()
    } else {
        0
    }
}
