//! `circulate-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the circulation error taxonomy, aggregate traits, the
//! transient event trait, and the injected clock.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod event;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CirculationError, CirculationResult};
pub use event::Event;
pub use id::{ItemId, LoanId, PatronId};
