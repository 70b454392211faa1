use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use circulate_core::{Aggregate, AggregateRoot, CirculationError, Event, ItemId};

/// Aggregate root: catalog Item.
///
/// An item is a title with a pool of physical copies. `available_copies` moves
/// only through commands: reserve decrements, release increments, capacity
/// edits shift it by the copies delta. Copies on loan are never recalled by a
/// resize; only the available pool shifts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    title: String,
    total_copies: u32,
    available_copies: u32,
    version: u64,
    created: bool,
}

impl Item {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: ItemId) -> Self {
        Self {
            id,
            title: String::new(),
            total_copies: 0,
            available_copies: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn total_copies(&self) -> u32 {
        self.total_copies
    }

    pub fn available_copies(&self) -> u32 {
        self.available_copies
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub item_id: ItemId,
    pub title: String,
    pub total_copies: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveCopy (one copy leaves the available pool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveCopy {
    pub item_id: ItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseCopy (one copy returns to the available pool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCopy {
    pub item_id: ItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResizeCapacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeCapacity {
    pub item_id: ItemId,
    pub new_total: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemCommand {
    RegisterItem(RegisterItem),
    ReserveCopy(ReserveCopy),
    ReleaseCopy(ReleaseCopy),
    ResizeCapacity(ResizeCapacity),
}

/// Event: ItemRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistered {
    pub item_id: ItemId,
    pub title: String,
    pub total_copies: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CopyReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyReserved {
    pub item_id: ItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CopyReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyReleased {
    pub item_id: ItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CapacityResized (carries the post-resize counts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityResized {
    pub item_id: ItemId,
    pub new_total: u32,
    pub new_available: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemEvent {
    ItemRegistered(ItemRegistered),
    CopyReserved(CopyReserved),
    CopyReleased(CopyReleased),
    CapacityResized(CapacityResized),
}

impl Event for ItemEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ItemEvent::ItemRegistered(_) => "catalog.item.registered",
            ItemEvent::CopyReserved(_) => "catalog.item.copy_reserved",
            ItemEvent::CopyReleased(_) => "catalog.item.copy_released",
            ItemEvent::CapacityResized(_) => "catalog.item.capacity_resized",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ItemEvent::ItemRegistered(e) => e.occurred_at,
            ItemEvent::CopyReserved(e) => e.occurred_at,
            ItemEvent::CopyReleased(e) => e.occurred_at,
            ItemEvent::CapacityResized(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Item {
    type Command = ItemCommand;
    type Event = ItemEvent;
    type Error = CirculationError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ItemEvent::ItemRegistered(e) => {
                self.id = e.item_id;
                self.title = e.title.clone();
                self.total_copies = e.total_copies;
                self.available_copies = e.total_copies;
                self.created = true;
            }
            ItemEvent::CopyReserved(_) => {
                self.available_copies -= 1;
            }
            ItemEvent::CopyReleased(_) => {
                self.available_copies += 1;
            }
            ItemEvent::CapacityResized(e) => {
                self.total_copies = e.new_total;
                self.available_copies = e.new_available;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ItemCommand::RegisterItem(cmd) => self.handle_register(cmd),
            ItemCommand::ReserveCopy(cmd) => self.handle_reserve(cmd),
            ItemCommand::ReleaseCopy(cmd) => self.handle_release(cmd),
            ItemCommand::ResizeCapacity(cmd) => self.handle_resize(cmd),
        }
    }
}

impl Item {
    fn ensure_item_id(&self, item_id: ItemId) -> Result<(), CirculationError> {
        if self.id != item_id {
            return Err(CirculationError::validation("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterItem) -> Result<Vec<ItemEvent>, CirculationError> {
        if self.created {
            return Err(CirculationError::conflict("item already registered"));
        }
        if cmd.title.trim().is_empty() {
            return Err(CirculationError::validation("title cannot be empty"));
        }
        if cmd.total_copies < 1 {
            return Err(CirculationError::invalid_capacity(
                "an item needs at least one copy",
            ));
        }

        Ok(vec![ItemEvent::ItemRegistered(ItemRegistered {
            item_id: cmd.item_id,
            title: cmd.title.clone(),
            total_copies: cmd.total_copies,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveCopy) -> Result<Vec<ItemEvent>, CirculationError> {
        if !self.created {
            return Err(CirculationError::not_found("item"));
        }
        self.ensure_item_id(cmd.item_id)?;

        if self.available_copies == 0 {
            return Err(CirculationError::NoCopiesAvailable);
        }

        Ok(vec![ItemEvent::CopyReserved(CopyReserved {
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseCopy) -> Result<Vec<ItemEvent>, CirculationError> {
        if !self.created {
            return Err(CirculationError::not_found("item"));
        }
        self.ensure_item_id(cmd.item_id)?;

        // Double-return guard.
        if self.available_copies >= self.total_copies {
            return Err(CirculationError::OverRelease);
        }

        Ok(vec![ItemEvent::CopyReleased(CopyReleased {
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_resize(&self, cmd: &ResizeCapacity) -> Result<Vec<ItemEvent>, CirculationError> {
        if !self.created {
            return Err(CirculationError::not_found("item"));
        }
        self.ensure_item_id(cmd.item_id)?;

        if cmd.new_total < 0 {
            return Err(CirculationError::invalid_capacity(
                "total copies cannot be negative",
            ));
        }

        let new_total = cmd.new_total as u32;
        let delta = cmd.new_total - i64::from(self.total_copies);
        let new_available =
            (i64::from(self.available_copies) + delta).clamp(0, cmd.new_total) as u32;

        Ok(vec![ItemEvent::CapacityResized(CapacityResized {
            item_id: cmd.item_id,
            new_total,
            new_available,
            occurred_at: cmd.occurred_at,
        })])
    }
}
