//! Stage cursor

use crate::pool::{FruitPool, SlotIndex};
use crate::record::FruitRecord;

/// A stage's pointer to the fruit it is working on.
///
/// Holds an id and a cached slot index. The cached slot is checked against
/// the slot's current id on every resolve, so a recycled slot is never
/// mistaken for the fruit it used to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCursor {
    id: i64,
    slot: Option<SlotIndex>,
}

impl StageCursor {
    pub fn new(id: i64) -> Self {
        Self { id, slot: None }
    }

    /// Fruit id this cursor points at
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Resolve the cursor to its record, if the fruit is in the pool
    pub fn resolve<'a>(&mut self, pool: &'a FruitPool) -> Option<&'a FruitRecord> {
        if let Some(record) = self.slot.and_then(|slot| pool.record(slot)) {
            if record.id() == self.id {
                return Some(record);
            }
        }

        self.slot = pool.find(self.id);
        self.slot.and_then(|slot| pool.record(slot))
    }

    /// Slot the cursor last resolved to
    pub fn slot(&self) -> Option<SlotIndex> {
        self.slot
    }

    /// Move to the next fruit id and re-resolve
    pub fn advance(&mut self, pool: &FruitPool) -> Option<SlotIndex> {
        self.id += 1;
        self.slot = pool.find(self.id);
        self.slot
    }

    /// Point at `id` again (used on handshake)
    pub fn reset(&mut self, id: i64) {
        self.id = id;
        self.slot = None;
    }
}
