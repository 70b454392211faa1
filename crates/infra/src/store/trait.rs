use std::sync::Arc;

use thiserror::Error;

use circulate_catalog::Item;
use circulate_core::{ExpectedVersion, ItemId, LoanId, PatronId};
use circulate_lending::{Loan, Patron};

/// Storage operation error.
///
/// Infrastructure failures only (contention, malformed batches); domain
/// failures never reach the store. `Conflict` is retryable — the caller
/// restarts the whole operation against a fresh snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("invalid write: {0}")]
    InvalidWrite(String),
}

/// One record in an atomic commit batch.
///
/// Each write carries the `ExpectedVersion` the caller observed at load time.
/// `Exact(0)` doubles as "the record must not exist yet": every created
/// aggregate is at version >= 1 after its first event.
#[derive(Debug, Clone)]
pub enum StoreWrite {
    Item {
        record: Item,
        expected: ExpectedVersion,
    },
    Patron {
        record: Patron,
        expected: ExpectedVersion,
    },
    Loan {
        record: Loan,
        expected: ExpectedVersion,
    },
}

/// The circulation storage boundary.
///
/// ## Design Principles
///
/// - **No storage assumptions**: works with the in-memory implementation
///   (tests/dev) and future SQL backends (production)
/// - **Optimistic locking**: via `ExpectedVersion` per record (no pessimistic
///   locks; contention surfaces as `Conflict` instead of blocking)
/// - **Atomic batches**: `commit` validates every expectation before applying
///   any write — a loan and its item update land together or not at all
///
/// ## Read Semantics
///
/// Reads return point-in-time clones. `loans()` returns a full snapshot for
/// the registry predicate queries; a loan committed after the snapshot is not
/// visible in it, which is why writers re-validate through `commit`.
pub trait LendingStore: Send + Sync {
    fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    fn patron(&self, id: PatronId) -> Result<Option<Patron>, StoreError>;

    fn loan(&self, id: LoanId) -> Result<Option<Loan>, StoreError>;

    /// Point-in-time snapshot of every loan record (append-only history).
    fn loans(&self) -> Result<Vec<Loan>, StoreError>;

    /// Atomically apply a batch of record writes.
    ///
    /// Implementations must:
    /// - validate every `ExpectedVersion` against the current record version
    ///   (absent record = version 0) before applying anything
    /// - apply all writes or none
    /// - reject batches naming the same record twice
    fn commit(&self, writes: Vec<StoreWrite>) -> Result<(), StoreError>;
}

impl<S> LendingStore for Arc<S>
where
    S: LendingStore + ?Sized,
{
    fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).item(id)
    }

    fn patron(&self, id: PatronId) -> Result<Option<Patron>, StoreError> {
        (**self).patron(id)
    }

    fn loan(&self, id: LoanId) -> Result<Option<Loan>, StoreError> {
        (**self).loan(id)
    }

    fn loans(&self) -> Result<Vec<Loan>, StoreError> {
        (**self).loans()
    }

    fn commit(&self, writes: Vec<StoreWrite>) -> Result<(), StoreError> {
        (**self).commit(writes)
    }
}
