use chrono::{DateTime, Utc};

/// A circulation domain event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
///
/// They are decision records produced by `Aggregate::handle` and consumed
/// in-process by the coordinator; the store persists the resulting record
/// snapshots rather than the events themselves.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "lending.loan.opened").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
