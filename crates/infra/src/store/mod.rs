pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryLendingStore;
pub use r#trait::{LendingStore, StoreError, StoreWrite};
