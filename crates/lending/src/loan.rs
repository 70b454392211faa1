use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use circulate_core::{Aggregate, AggregateRoot, CirculationError, Event, ItemId, LoanId, PatronId};

/// Loan status lifecycle.
///
/// ```text
///          open()             return()
///  [none] ───────► BORROWED ───────────► RETURNED   (terminal)
///                     │   \
///            mark_overdue   mark_lost()
///                     │         \
///                     ▼          ▼
///                 OVERDUE ───► LOST                  (terminal)
///                     │
///                  return()
///                     ▼
///                 RETURNED
/// ```
///
/// Status is monotone along these edges; nothing re-enters BORROWED. Renewal
/// is not a transition — it only extends the due date while still BORROWED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Borrowed,
    Returned,
    Overdue,
    Lost,
}

impl LoanStatus {
    /// Active means the copy is out: borrowed or overdue.
    pub fn is_active(self) -> bool {
        matches!(self, LoanStatus::Borrowed | LoanStatus::Overdue)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoanStatus::Returned | LoanStatus::Lost)
    }
}

/// Aggregate root: Loan — one lending transaction linking a patron and an item.
///
/// Loans are append-only history: they are never deleted, and the fine amount
/// is computed exactly once, at the terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    id: LoanId,
    patron_id: Option<PatronId>,
    item_id: Option<ItemId>,
    borrow_date: NaiveDate,
    due_date: NaiveDate,
    return_date: Option<NaiveDate>,
    status: LoanStatus,
    fine_amount: f64,
    notes: Option<String>,
    version: u64,
    created: bool,
}

impl Loan {
    /// Create an empty, not-yet-opened aggregate instance for rehydration.
    pub fn empty(id: LoanId) -> Self {
        Self {
            id,
            patron_id: None,
            item_id: None,
            borrow_date: NaiveDate::default(),
            due_date: NaiveDate::default(),
            return_date: None,
            status: LoanStatus::Borrowed,
            fine_amount: 0.0,
            notes: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LoanId {
        self.id
    }

    pub fn patron_id(&self) -> Option<PatronId> {
        self.patron_id
    }

    pub fn item_id(&self) -> Option<ItemId> {
        self.item_id
    }

    pub fn borrow_date(&self) -> NaiveDate {
        self.borrow_date
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn return_date(&self) -> Option<NaiveDate> {
        self.return_date
    }

    pub fn status(&self) -> LoanStatus {
        self.status
    }

    pub fn fine_amount(&self) -> f64 {
        self.fine_amount
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.created && self.status.is_active()
    }
}

impl AggregateRoot for Loan {
    type Id = LoanId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenLoan (a successful borrow).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenLoan {
    pub loan_id: LoanId,
    pub patron_id: PatronId,
    pub item_id: ItemId,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReturnLoan.
///
/// Carries the policy's per-day rate so the fine is decided here, in the
/// state machine, rather than scattered across call sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnLoan {
    pub loan_id: LoanId,
    pub returned_on: NaiveDate,
    pub fine_per_day: f64,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RenewLoan (due-date extension, not a status transition).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewLoan {
    pub loan_id: LoanId,
    pub today: NaiveDate,
    pub additional_days: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkLost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkLost {
    pub loan_id: LoanId,
    pub fine: f64,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkOverdue (issued by the sweep).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkOverdue {
    pub loan_id: LoanId,
    pub as_of: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoanCommand {
    OpenLoan(OpenLoan),
    ReturnLoan(ReturnLoan),
    RenewLoan(RenewLoan),
    MarkLost(MarkLost),
    MarkOverdue(MarkOverdue),
}

/// Event: LoanOpened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanOpened {
    pub loan_id: LoanId,
    pub patron_id: PatronId,
    pub item_id: ItemId,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoanReturned (carries the fine decided at return time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanReturned {
    pub loan_id: LoanId,
    pub returned_on: NaiveDate,
    pub fine_amount: f64,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DueDateExtended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DueDateExtended {
    pub loan_id: LoanId,
    pub new_due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoanMarkedLost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanMarkedLost {
    pub loan_id: LoanId,
    pub fine_amount: f64,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoanMarkedOverdue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanMarkedOverdue {
    pub loan_id: LoanId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoanEvent {
    LoanOpened(LoanOpened),
    LoanReturned(LoanReturned),
    DueDateExtended(DueDateExtended),
    LoanMarkedLost(LoanMarkedLost),
    LoanMarkedOverdue(LoanMarkedOverdue),
}

impl Event for LoanEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LoanEvent::LoanOpened(_) => "lending.loan.opened",
            LoanEvent::LoanReturned(_) => "lending.loan.returned",
            LoanEvent::DueDateExtended(_) => "lending.loan.due_date_extended",
            LoanEvent::LoanMarkedLost(_) => "lending.loan.marked_lost",
            LoanEvent::LoanMarkedOverdue(_) => "lending.loan.marked_overdue",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LoanEvent::LoanOpened(e) => e.occurred_at,
            LoanEvent::LoanReturned(e) => e.occurred_at,
            LoanEvent::DueDateExtended(e) => e.occurred_at,
            LoanEvent::LoanMarkedLost(e) => e.occurred_at,
            LoanEvent::LoanMarkedOverdue(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Loan {
    type Command = LoanCommand;
    type Event = LoanEvent;
    type Error = CirculationError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LoanEvent::LoanOpened(e) => {
                self.id = e.loan_id;
                self.patron_id = Some(e.patron_id);
                self.item_id = Some(e.item_id);
                self.borrow_date = e.borrow_date;
                self.due_date = e.due_date;
                self.status = LoanStatus::Borrowed;
                self.created = true;
            }
            LoanEvent::LoanReturned(e) => {
                self.return_date = Some(e.returned_on);
                self.fine_amount = e.fine_amount;
                self.notes = e.notes.clone();
                self.status = LoanStatus::Returned;
            }
            LoanEvent::DueDateExtended(e) => {
                self.due_date = e.new_due_date;
            }
            LoanEvent::LoanMarkedLost(e) => {
                self.fine_amount = e.fine_amount;
                self.notes = e.notes.clone();
                self.status = LoanStatus::Lost;
            }
            LoanEvent::LoanMarkedOverdue(_) => {
                self.status = LoanStatus::Overdue;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LoanCommand::OpenLoan(cmd) => self.handle_open(cmd),
            LoanCommand::ReturnLoan(cmd) => self.handle_return(cmd),
            LoanCommand::RenewLoan(cmd) => self.handle_renew(cmd),
            LoanCommand::MarkLost(cmd) => self.handle_mark_lost(cmd),
            LoanCommand::MarkOverdue(cmd) => self.handle_mark_overdue(cmd),
        }
    }
}

impl Loan {
    fn ensure_loan_id(&self, loan_id: LoanId) -> Result<(), CirculationError> {
        if self.id != loan_id {
            return Err(CirculationError::validation("loan_id mismatch"));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), CirculationError> {
        if !self.created {
            return Err(CirculationError::not_found("loan"));
        }
        if !self.status.is_active() {
            return Err(CirculationError::invalid_state(
                "loan is not currently active",
            ));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenLoan) -> Result<Vec<LoanEvent>, CirculationError> {
        if self.created {
            return Err(CirculationError::conflict("loan already exists"));
        }

        // A due date in the past is accepted as-is; the loan simply starts
        // out accruing lateness.
        Ok(vec![LoanEvent::LoanOpened(LoanOpened {
            loan_id: cmd.loan_id,
            patron_id: cmd.patron_id,
            item_id: cmd.item_id,
            borrow_date: cmd.borrow_date,
            due_date: cmd.due_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &ReturnLoan) -> Result<Vec<LoanEvent>, CirculationError> {
        self.ensure_loan_id(cmd.loan_id)?;
        self.ensure_active()?;

        let days_late = (cmd.returned_on - self.due_date).num_days();
        let fine_amount = if days_late > 0 {
            days_late as f64 * cmd.fine_per_day
        } else {
            0.0
        };

        Ok(vec![LoanEvent::LoanReturned(LoanReturned {
            loan_id: cmd.loan_id,
            returned_on: cmd.returned_on,
            fine_amount,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_renew(&self, cmd: &RenewLoan) -> Result<Vec<LoanEvent>, CirculationError> {
        self.ensure_loan_id(cmd.loan_id)?;
        if !self.created {
            return Err(CirculationError::not_found("loan"));
        }

        if cmd.additional_days <= 0 {
            return Err(CirculationError::invalid_argument(
                "additional days must be positive",
            ));
        }

        match self.status {
            // OVERDUE status and "borrowed past due" are the same predicate
            // as far as renewal is concerned.
            LoanStatus::Overdue => Err(CirculationError::AlreadyOverdue),
            LoanStatus::Borrowed if cmd.today > self.due_date => {
                Err(CirculationError::AlreadyOverdue)
            }
            LoanStatus::Borrowed => Ok(vec![LoanEvent::DueDateExtended(DueDateExtended {
                loan_id: cmd.loan_id,
                new_due_date: self.due_date + chrono::Duration::days(cmd.additional_days),
                occurred_at: cmd.occurred_at,
            })]),
            LoanStatus::Returned | LoanStatus::Lost => Err(CirculationError::invalid_state(
                "cannot renew a closed loan",
            )),
        }
    }

    fn handle_mark_lost(&self, cmd: &MarkLost) -> Result<Vec<LoanEvent>, CirculationError> {
        self.ensure_loan_id(cmd.loan_id)?;
        self.ensure_active()?;

        if cmd.fine < 0.0 {
            return Err(CirculationError::invalid_argument(
                "lost-copy fine cannot be negative",
            ));
        }

        Ok(vec![LoanEvent::LoanMarkedLost(LoanMarkedLost {
            loan_id: cmd.loan_id,
            fine_amount: cmd.fine,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_overdue(&self, cmd: &MarkOverdue) -> Result<Vec<LoanEvent>, CirculationError> {
        self.ensure_loan_id(cmd.loan_id)?;
        if !self.created {
            return Err(CirculationError::not_found("loan"));
        }

        match self.status {
            // Idempotent: the sweep may visit a loan any number of times.
            LoanStatus::Overdue => Ok(vec![]),
            LoanStatus::Borrowed if cmd.as_of > self.due_date => {
                Ok(vec![LoanEvent::LoanMarkedOverdue(LoanMarkedOverdue {
                    loan_id: cmd.loan_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            // Not yet past due: nothing to do.
            LoanStatus::Borrowed => Ok(vec![]),
            LoanStatus::Returned | LoanStatus::Lost => Err(CirculationError::invalid_state(
                "cannot mark a closed loan overdue",
            )),
        }
    }
}
