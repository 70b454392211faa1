use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use circulate_core::{Aggregate, AggregateRoot, CirculationError, Event, PatronId};

/// Aggregate root: Patron — a registered borrower.
///
/// Deliberately thin: profile data lives with the membership layer. The
/// patron's active-loan count is derived from the loan registry, never stored
/// here. The record's version is what matters: the coordinator writes a
/// version bump alongside every new loan, which serializes concurrent borrows
/// by the same patron and makes the borrow-limit check race-free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patron {
    id: PatronId,
    name: String,
    version: u64,
    created: bool,
}

impl Patron {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: PatronId) -> Self {
        Self {
            id,
            name: String::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PatronId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }

    /// Advance the version without changing state.
    ///
    /// Used by the coordinator as the per-patron serialization point: a borrow
    /// commits this bump with the loaded version as its expectation, so two
    /// concurrent borrows by the same patron cannot both pass the limit check.
    pub fn note_activity(&mut self) {
        self.version += 1;
    }
}

impl AggregateRoot for Patron {
    type Id = PatronId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterPatron.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPatron {
    pub patron_id: PatronId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatronCommand {
    RegisterPatron(RegisterPatron),
}

/// Event: PatronRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatronRegistered {
    pub patron_id: PatronId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatronEvent {
    PatronRegistered(PatronRegistered),
}

impl Event for PatronEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PatronEvent::PatronRegistered(_) => "lending.patron.registered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PatronEvent::PatronRegistered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Patron {
    type Command = PatronCommand;
    type Event = PatronEvent;
    type Error = CirculationError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PatronEvent::PatronRegistered(e) => {
                self.id = e.patron_id;
                self.name = e.name.clone();
                self.created = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PatronCommand::RegisterPatron(cmd) => {
                if self.created {
                    return Err(CirculationError::conflict("patron already registered"));
                }
                if cmd.name.trim().is_empty() {
                    return Err(CirculationError::validation("name cannot be empty"));
                }
                Ok(vec![PatronEvent::PatronRegistered(PatronRegistered {
                    patron_id: cmd.patron_id,
                    name: cmd.name.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
