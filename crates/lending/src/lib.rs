//! `circulate-lending` — the loan registry.
//!
//! Owns the loan state machine (BORROWED → RETURNED / OVERDUE / LOST), the
//! patron roster, the registry predicate queries, and the lending policy
//! constants. Everything here is pure domain logic; orchestration and storage
//! live in `circulate-infra`.

pub mod loan;
pub mod patron;
pub mod policy;
pub mod registry;

pub use loan::{
    DueDateExtended, Loan, LoanCommand, LoanEvent, LoanMarkedLost, LoanMarkedOverdue, LoanOpened,
    LoanReturned, LoanStatus, MarkLost, MarkOverdue, OpenLoan, RenewLoan, ReturnLoan,
};
pub use patron::{Patron, PatronCommand, PatronEvent, PatronRegistered, RegisterPatron};
pub use policy::LendingPolicy;
