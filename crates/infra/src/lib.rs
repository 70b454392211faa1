//! Infrastructure layer: the storage boundary and the lending coordinator.

pub mod coordinator;
pub mod store;

pub use coordinator::LendingCoordinator;
pub use store::{InMemoryLendingStore, LendingStore, StoreError, StoreWrite};

#[cfg(test)]
mod integration_tests;
