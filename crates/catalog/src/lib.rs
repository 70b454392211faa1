//! `circulate-catalog` — the inventory ledger.
//!
//! Tracks total and available copy counts per catalog item and enforces the
//! pool invariants (`available <= total`, never negative). Copy counts change
//! only through [`ItemCommand`]s driven by the lending coordinator.

pub mod item;

pub use item::{
    CapacityResized, CopyReleased, CopyReserved, Item, ItemCommand, ItemEvent, ItemRegistered,
    RegisterItem, ReleaseCopy, ReserveCopy, ResizeCapacity,
};
