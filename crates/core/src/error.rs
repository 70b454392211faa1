//! Circulation error model.

use thiserror::Error;

/// Result type used across the circulation domain.
pub type CirculationResult<T> = Result<T, CirculationError>;

/// Domain-level circulation error.
///
/// Keep this focused on deterministic, business/domain failures. `Conflict` is
/// the one retryable kind (concurrent-write contention); every other variant is
/// terminal for the request that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CirculationError {
    /// A referenced item, patron, or loan does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Every copy of the item is already on loan.
    #[error("no copies available")]
    NoCopiesAvailable,

    /// Releasing a copy would push the available pool past the total
    /// (double-return guard).
    #[error("release would exceed total copies")]
    OverRelease,

    /// A capacity edit was rejected.
    #[error("invalid capacity: {0}")]
    InvalidCapacity(String),

    /// The patron already has an active loan for this item.
    #[error("patron already has an active loan for this item")]
    DuplicateLoan,

    /// The patron is at their active-loan cap.
    #[error("borrow limit exceeded")]
    BorrowLimitExceeded,

    /// An illegal status transition was attempted.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Renewal was requested for a loan that is already past its due date.
    #[error("loan is already overdue")]
    AlreadyOverdue,

    /// A caller-supplied argument was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A concurrent write won; the caller may retry the whole operation.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl CirculationError {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }

    pub fn invalid_capacity(msg: impl Into<String>) -> Self {
        Self::InvalidCapacity(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Whether retrying the whole operation can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
