//! Lending coordination pipeline (application-level orchestration).
//!
//! Every operation follows the same shape: load records, rehydrate aggregates,
//! decide events (`handle`, pure), evolve state (`apply`), commit the updated
//! record snapshots as one atomic batch. Optimistic concurrency does the
//! serialization:
//!
//! - the **item** record version serializes all copy movements for one title,
//!   so two borrows can never both take the last copy;
//! - the **patron** record version is bumped on every borrow, so the
//!   borrow-limit and duplicate-loan checks cannot be raced by the same
//!   patron;
//! - a **loan** insert expects version 0, so one loan id is created once.
//!
//! A losing writer gets `Conflict`; the coordinator retries the whole
//! operation against a fresh snapshot a bounded number of times, which is how
//! a raced borrow comes back as `DuplicateLoan`/`NoCopiesAvailable` rather
//! than a raw conflict. The coordinator holds no state beyond policy and the
//! injected clock.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use circulate_catalog::{Item, ItemCommand, RegisterItem, ReleaseCopy, ReserveCopy, ResizeCapacity};
use circulate_core::{
    Aggregate, AggregateRoot, CirculationError, CirculationResult, Clock, Event, ExpectedVersion,
    ItemId, LoanId, PatronId,
};
use circulate_lending::{
    LendingPolicy, Loan, LoanCommand, MarkLost, MarkOverdue, OpenLoan, Patron, PatronCommand,
    RegisterPatron, RenewLoan, ReturnLoan, registry,
};

use crate::store::{LendingStore, StoreError, StoreWrite};

/// Bounded whole-operation retry on optimistic-concurrency conflicts.
const MAX_CONFLICT_RETRIES: u32 = 3;

impl From<StoreError> for CirculationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => CirculationError::Conflict(msg),
            StoreError::InvalidWrite(msg) => CirculationError::Validation(msg),
        }
    }
}

/// Orchestrates borrow/return/renew/lost and the overdue sweep across the
/// inventory ledger and the loan registry.
#[derive(Debug)]
pub struct LendingCoordinator<S> {
    store: S,
    clock: Arc<dyn Clock>,
    policy: LendingPolicy,
}

impl<S> LendingCoordinator<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, policy: LendingPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &LendingPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Decide events for a command, then evolve the aggregate with them.
fn drive<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: Aggregate,
    A::Event: Event,
{
    let events = aggregate.handle(command)?;
    for event in &events {
        debug!(event_type = event.event_type(), "applying event");
        aggregate.apply(event);
    }
    Ok(events)
}

impl<S> LendingCoordinator<S>
where
    S: LendingStore,
{
    fn with_conflict_retry<T>(
        &self,
        op: &'static str,
        mut attempt: impl FnMut() -> CirculationResult<T>,
    ) -> CirculationResult<T> {
        let mut last = CirculationError::conflict("no attempt made");
        for n in 1..=MAX_CONFLICT_RETRIES {
            match attempt() {
                Err(e) if e.is_retryable() => {
                    debug!(op, attempt = n, "conflict, retrying whole operation");
                    last = e;
                }
                other => return other,
            }
        }
        Err(last)
    }

    /// Seam for the catalog layer: add a title to the inventory ledger.
    ///
    /// The available pool starts equal to `total_copies`.
    pub fn register_item(
        &self,
        item_id: ItemId,
        title: impl Into<String>,
        total_copies: u32,
    ) -> CirculationResult<Item> {
        let title = title.into();
        let mut item = Item::empty(item_id);
        drive(
            &mut item,
            &ItemCommand::RegisterItem(RegisterItem {
                item_id,
                title,
                total_copies,
                occurred_at: self.clock.now(),
            }),
        )?;

        self.store.commit(vec![StoreWrite::Item {
            record: item.clone(),
            expected: ExpectedVersion::Exact(0),
        }])?;

        info!(item_id = %item_id, total_copies, "item registered");
        Ok(item)
    }

    /// Seam for the membership layer: add a borrower.
    pub fn register_patron(
        &self,
        patron_id: PatronId,
        name: impl Into<String>,
    ) -> CirculationResult<Patron> {
        let name = name.into();
        let mut patron = Patron::empty(patron_id);
        drive(
            &mut patron,
            &PatronCommand::RegisterPatron(RegisterPatron {
                patron_id,
                name,
                occurred_at: self.clock.now(),
            }),
        )?;

        self.store.commit(vec![StoreWrite::Patron {
            record: patron.clone(),
            expected: ExpectedVersion::Exact(0),
        }])?;

        info!(patron_id = %patron_id, "patron registered");
        Ok(patron)
    }

    /// Lend one copy of an item to a patron.
    ///
    /// Validates duplicate-loan and borrow-limit rules against a fresh
    /// snapshot, reserves a copy, and commits the new loan, the item update,
    /// and a patron version bump as one atomic unit.
    pub fn borrow(
        &self,
        patron_id: PatronId,
        item_id: ItemId,
        due_date: Option<NaiveDate>,
    ) -> CirculationResult<Loan> {
        self.with_conflict_retry("borrow", || {
            let mut patron = self
                .store
                .patron(patron_id)?
                .ok_or_else(|| CirculationError::not_found("patron"))?;
            let mut item = self
                .store
                .item(item_id)?
                .ok_or_else(|| CirculationError::not_found("item"))?;
            let loans = self.store.loans()?;

            if registry::active_loan_for(&loans, patron_id, item_id).is_some() {
                return Err(CirculationError::DuplicateLoan);
            }
            if registry::count_active(&loans, patron_id) >= self.policy.max_active_loans as usize {
                return Err(CirculationError::BorrowLimitExceeded);
            }

            let item_expected = ExpectedVersion::Exact(item.version());
            let patron_expected = ExpectedVersion::Exact(patron.version());

            drive(
                &mut item,
                &ItemCommand::ReserveCopy(ReserveCopy {
                    item_id,
                    occurred_at: self.clock.now(),
                }),
            )?;
            patron.note_activity();

            let today = self.clock.today();
            let loan_id = LoanId::new();
            let mut loan = Loan::empty(loan_id);
            drive(
                &mut loan,
                &LoanCommand::OpenLoan(OpenLoan {
                    loan_id,
                    patron_id,
                    item_id,
                    borrow_date: today,
                    due_date: due_date
                        .unwrap_or(today + Duration::days(self.policy.default_loan_days)),
                    occurred_at: self.clock.now(),
                }),
            )?;

            self.store.commit(vec![
                StoreWrite::Loan {
                    record: loan.clone(),
                    expected: ExpectedVersion::Exact(0),
                },
                StoreWrite::Item {
                    record: item,
                    expected: item_expected,
                },
                StoreWrite::Patron {
                    record: patron,
                    expected: patron_expected,
                },
            ])?;

            info!(
                loan_id = %loan_id,
                patron_id = %patron_id,
                item_id = %item_id,
                due_date = %loan.due_date(),
                "loan opened"
            );
            Ok(loan)
        })
    }

    /// Close a loan and put the copy back in the available pool.
    ///
    /// The late fine is decided inside the loan state machine from today's
    /// date; the loan and item updates commit atomically.
    pub fn return_loan(&self, loan_id: LoanId, notes: Option<String>) -> CirculationResult<Loan> {
        self.with_conflict_retry("return_loan", || {
            let mut loan = self
                .store
                .loan(loan_id)?
                .ok_or_else(|| CirculationError::not_found("loan"))?;
            let item_id = loan
                .item_id()
                .ok_or_else(|| CirculationError::invalid_state("loan has no item"))?;
            let mut item = self
                .store
                .item(item_id)?
                .ok_or_else(|| CirculationError::not_found("item"))?;

            let loan_expected = ExpectedVersion::Exact(loan.version());
            let item_expected = ExpectedVersion::Exact(item.version());

            drive(
                &mut loan,
                &LoanCommand::ReturnLoan(ReturnLoan {
                    loan_id,
                    returned_on: self.clock.today(),
                    fine_per_day: self.policy.fine_per_day,
                    notes: notes.clone(),
                    occurred_at: self.clock.now(),
                }),
            )?;
            drive(
                &mut item,
                &ItemCommand::ReleaseCopy(ReleaseCopy {
                    item_id,
                    occurred_at: self.clock.now(),
                }),
            )?;

            self.store.commit(vec![
                StoreWrite::Loan {
                    record: loan.clone(),
                    expected: loan_expected,
                },
                StoreWrite::Item {
                    record: item,
                    expected: item_expected,
                },
            ])?;

            info!(
                loan_id = %loan_id,
                fine_amount = loan.fine_amount(),
                "loan returned"
            );
            Ok(loan)
        })
    }

    /// Extend a loan's due date. Not a status transition; rejected once the
    /// loan is past due.
    pub fn renew(&self, loan_id: LoanId, additional_days: i64) -> CirculationResult<Loan> {
        self.with_conflict_retry("renew", || {
            let mut loan = self
                .store
                .loan(loan_id)?
                .ok_or_else(|| CirculationError::not_found("loan"))?;
            let expected = ExpectedVersion::Exact(loan.version());

            drive(
                &mut loan,
                &LoanCommand::RenewLoan(RenewLoan {
                    loan_id,
                    today: self.clock.today(),
                    additional_days,
                    occurred_at: self.clock.now(),
                }),
            )?;

            self.store.commit(vec![StoreWrite::Loan {
                record: loan.clone(),
                expected,
            }])?;

            info!(loan_id = %loan_id, due_date = %loan.due_date(), "loan renewed");
            Ok(loan)
        })
    }

    /// Record a copy as lost: flat fine, terminal status.
    ///
    /// Deliberately does **not** release the copy back to the pool; the copy
    /// is gone.
    pub fn mark_lost(&self, loan_id: LoanId, notes: Option<String>) -> CirculationResult<Loan> {
        self.with_conflict_retry("mark_lost", || {
            let mut loan = self
                .store
                .loan(loan_id)?
                .ok_or_else(|| CirculationError::not_found("loan"))?;
            let expected = ExpectedVersion::Exact(loan.version());

            drive(
                &mut loan,
                &LoanCommand::MarkLost(MarkLost {
                    loan_id,
                    fine: self.policy.lost_copy_fine,
                    notes: notes.clone(),
                    occurred_at: self.clock.now(),
                }),
            )?;

            self.store.commit(vec![StoreWrite::Loan {
                record: loan.clone(),
                expected,
            }])?;

            info!(loan_id = %loan_id, fine_amount = loan.fine_amount(), "loan marked lost");
            Ok(loan)
        })
    }

    /// Change an item's total copy count; the available pool shifts by the
    /// same delta, clamped. Copies on loan are not recalled.
    pub fn resize_capacity(&self, item_id: ItemId, new_total: i64) -> CirculationResult<Item> {
        self.with_conflict_retry("resize_capacity", || {
            let mut item = self
                .store
                .item(item_id)?
                .ok_or_else(|| CirculationError::not_found("item"))?;
            let expected = ExpectedVersion::Exact(item.version());

            drive(
                &mut item,
                &ItemCommand::ResizeCapacity(ResizeCapacity {
                    item_id,
                    new_total,
                    occurred_at: self.clock.now(),
                }),
            )?;

            self.store.commit(vec![StoreWrite::Item {
                record: item.clone(),
                expected,
            }])?;

            info!(item_id = %item_id, new_total, "capacity resized");
            Ok(item)
        })
    }

    /// The overdue sweep: flip every BORROWED loan past its due date to
    /// OVERDUE. Idempotent; each loan is an independent atomic transition, so
    /// the sweep may run concurrently with borrows and returns.
    ///
    /// Returns the number of loans flipped this pass.
    pub fn update_overdue_status(&self, as_of: Option<NaiveDate>) -> CirculationResult<usize> {
        let as_of = as_of.unwrap_or_else(|| self.clock.today());
        let loans = self.store.loans()?;
        let candidates: Vec<LoanId> = registry::overdue_as_of(&loans, as_of)
            .iter()
            .map(|loan| loan.id_typed())
            .collect();

        let mut flipped = 0usize;
        for loan_id in candidates {
            // Re-load per loan: the snapshot may be stale by now.
            let Some(mut loan) = self.store.loan(loan_id)? else {
                continue;
            };
            let expected = ExpectedVersion::Exact(loan.version());

            let events = match drive(
                &mut loan,
                &LoanCommand::MarkOverdue(MarkOverdue {
                    loan_id,
                    as_of,
                    occurred_at: self.clock.now(),
                }),
            ) {
                Ok(events) => events,
                // Returned or lost since the snapshot: nothing to flip.
                Err(CirculationError::InvalidState(_)) => continue,
                Err(e) => return Err(e),
            };
            if events.is_empty() {
                continue;
            }

            match self.store.commit(vec![StoreWrite::Loan {
                record: loan,
                expected,
            }]) {
                Ok(()) => flipped += 1,
                // A racing return won this loan; the next sweep re-evaluates.
                Err(StoreError::Conflict(_)) => {
                    debug!(loan_id = %loan_id, "sweep lost the race, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(as_of = %as_of, flipped, "overdue sweep complete");
        Ok(flipped)
    }

    /// The active loan for a (patron, item) pair, if any.
    pub fn find_active_loan(
        &self,
        patron_id: PatronId,
        item_id: ItemId,
    ) -> CirculationResult<Option<Loan>> {
        let loans = self.store.loans()?;
        Ok(registry::active_loan_for(&loans, patron_id, item_id).cloned())
    }

    /// Number of active loans held by a patron.
    pub fn count_active(&self, patron_id: PatronId) -> CirculationResult<usize> {
        let loans = self.store.loans()?;
        Ok(registry::count_active(&loans, patron_id))
    }

    /// BORROWED loans strictly past due as of `as_of` (defaults to today).
    pub fn list_overdue(&self, as_of: Option<NaiveDate>) -> CirculationResult<Vec<Loan>> {
        let as_of = as_of.unwrap_or_else(|| self.clock.today());
        let loans = self.store.loans()?;
        Ok(registry::overdue_as_of(&loans, as_of)
            .into_iter()
            .cloned()
            .collect())
    }

    /// BORROWED loans due within the next `days` days (inclusive window).
    pub fn list_due_within(
        &self,
        as_of: Option<NaiveDate>,
        days: i64,
    ) -> CirculationResult<Vec<Loan>> {
        let as_of = as_of.unwrap_or_else(|| self.clock.today());
        let loans = self.store.loans()?;
        Ok(registry::due_within(&loans, as_of, days)
            .into_iter()
            .cloned()
            .collect())
    }
}
