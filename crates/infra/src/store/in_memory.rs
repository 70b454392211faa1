use std::collections::HashMap;
use std::sync::RwLock;

use circulate_catalog::Item;
use circulate_core::{AggregateRoot, ExpectedVersion, ItemId, LoanId, PatronId};
use circulate_lending::{Loan, Patron};

use super::r#trait::{LendingStore, StoreError, StoreWrite};

#[derive(Debug, Default)]
struct Inner {
    items: HashMap<ItemId, Item>,
    patrons: HashMap<PatronId, Patron>,
    loans: HashMap<LoanId, Loan>,
}

/// In-memory circulation store.
///
/// Three record maps behind a single `RwLock`: a commit takes the write lock
/// once, validates every expectation, then applies every write, which makes
/// the batch linearizable with respect to every other commit and snapshot.
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryLendingStore {
    inner: RwLock<Inner>,
}

impl InMemoryLendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum RecordKey {
    Item(ItemId),
    Patron(PatronId),
    Loan(LoanId),
}

fn record_key(write: &StoreWrite) -> RecordKey {
    match write {
        StoreWrite::Item { record, .. } => RecordKey::Item(record.id_typed()),
        StoreWrite::Patron { record, .. } => RecordKey::Patron(record.id_typed()),
        StoreWrite::Loan { record, .. } => RecordKey::Loan(record.id_typed()),
    }
}

fn check(
    kind: &str,
    key: &dyn core::fmt::Debug,
    expected: ExpectedVersion,
    current: u64,
    new_version: u64,
) -> Result<(), StoreError> {
    if !expected.matches(current) {
        return Err(StoreError::Conflict(format!(
            "{kind} {key:?}: expected {expected:?}, found {current}"
        )));
    }
    if new_version <= current {
        return Err(StoreError::InvalidWrite(format!(
            "{kind} {key:?}: record version must advance (current {current}, write {new_version})"
        )));
    }
    Ok(())
}

impl LendingStore for InMemoryLendingStore {
    fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Conflict("lock poisoned".to_string()))?;
        Ok(inner.items.get(&id).cloned())
    }

    fn patron(&self, id: PatronId) -> Result<Option<Patron>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Conflict("lock poisoned".to_string()))?;
        Ok(inner.patrons.get(&id).cloned())
    }

    fn loan(&self, id: LoanId) -> Result<Option<Loan>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Conflict("lock poisoned".to_string()))?;
        Ok(inner.loans.get(&id).cloned())
    }

    fn loans(&self) -> Result<Vec<Loan>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Conflict("lock poisoned".to_string()))?;
        Ok(inner.loans.values().cloned().collect())
    }

    fn commit(&self, writes: Vec<StoreWrite>) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }

        // A batch naming the same record twice would make the second
        // expectation check read a stale version.
        for (idx, write) in writes.iter().enumerate() {
            let key = record_key(write);
            if writes[..idx].iter().any(|w| record_key(w) == key) {
                return Err(StoreError::InvalidWrite(format!(
                    "batch names {key:?} more than once"
                )));
            }
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::Conflict("lock poisoned".to_string()))?;

        // Validate every expectation before applying anything.
        for write in &writes {
            match write {
                StoreWrite::Item { record, expected } => {
                    let id = record.id_typed();
                    let current = inner.items.get(&id).map(|r| r.version()).unwrap_or(0);
                    check("item", &id, *expected, current, record.version())?;
                }
                StoreWrite::Patron { record, expected } => {
                    let id = record.id_typed();
                    let current = inner.patrons.get(&id).map(|r| r.version()).unwrap_or(0);
                    check("patron", &id, *expected, current, record.version())?;
                }
                StoreWrite::Loan { record, expected } => {
                    let id = record.id_typed();
                    let current = inner.loans.get(&id).map(|r| r.version()).unwrap_or(0);
                    check("loan", &id, *expected, current, record.version())?;
                }
            }
        }

        for write in writes {
            match write {
                StoreWrite::Item { record, .. } => {
                    inner.items.insert(record.id_typed(), record);
                }
                StoreWrite::Patron { record, .. } => {
                    inner.patrons.insert(record.id_typed(), record);
                }
                StoreWrite::Loan { record, .. } => {
                    inner.loans.insert(record.id_typed(), record);
                }
            }
        }

        Ok(())
    }
}
