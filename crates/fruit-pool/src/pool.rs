//! Fruit Pool Implementation

use crate::record::FruitRecord;
use crate::{FruitSnapshot, PoolError};
use sorter_protocol::FruitState;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use tracing::debug;

/// Default number of slots (fruits that can be on the line at once)
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Position of a record in the pool
pub type SlotIndex = usize;

/// A state change found by [`FruitPool::scan_transitions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub slot: SlotIndex,
    pub id: i64,
    pub from: FruitState,
    pub to: FruitState,
}

/// Fixed-size rotating arena of fruit records
pub struct FruitPool {
    /// Pre-allocated slots, never resized
    slots: Box<[FruitRecord]>,
    /// Id handed to the next recycled slot
    next_id: AtomicI64,
    /// Total slots recycled (for statistics)
    total_recycled: AtomicUsize,
}

impl FruitPool {
    /// Create a pool with `capacity` slots in the zero state
    pub fn new(capacity: usize) -> Self {
        let slots: Vec<FruitRecord> = (0..capacity).map(|_| FruitRecord::default()).collect();
        Self {
            slots: slots.into_boxed_slice(),
            next_id: AtomicI64::new(0),
            total_recycled: AtomicUsize::new(0),
        }
    }

    /// Create a pool with the default number of slots
    pub fn with_default_size() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }

    /// Create a pool of `count` slots holding ids `start_id..start_id + count`
    pub fn initialize(start_id: i64, count: usize) -> Self {
        let pool = Self::new(count);
        pool.populate(start_id);
        pool
    }

    /// Assign `start_id..start_id + capacity` to the slots in order.
    ///
    /// Only call while no stage task is running.
    pub fn populate(&self, start_id: i64) {
        for (offset, slot) in self.slots.iter().enumerate() {
            slot.reset(start_id + offset as i64);
        }
        self.next_id
            .store(start_id + self.slots.len() as i64, Ordering::Release);
        self.total_recycled.store(0, Ordering::Relaxed);
        debug!(
            "Pool populated with ids {}..{}",
            start_id,
            start_id + self.slots.len() as i64
        );
    }

    /// Return every slot and counter to the zero state
    pub fn reset(&self) {
        for slot in self.slots.iter() {
            slot.reset(0);
        }
        self.next_id.store(0, Ordering::Release);
        self.total_recycled.store(0, Ordering::Relaxed);
    }

    /// Find the slot currently holding `id`
    pub fn find(&self, id: i64) -> Option<SlotIndex> {
        self.slots.iter().position(|slot| slot.id() == id)
    }

    /// Find the record currently holding `id`
    pub fn find_record(&self, id: i64) -> Option<&FruitRecord> {
        self.find(id).map(|slot| &self.slots[slot])
    }

    /// Get the record at `slot`
    pub fn record(&self, slot: SlotIndex) -> Option<&FruitRecord> {
        self.slots.get(slot)
    }

    /// Reset `slot` and give it the next id. Returns the new id.
    pub fn recycle(&self, slot: SlotIndex) -> Result<i64, PoolError> {
        let record = self.slots.get(slot).ok_or(PoolError::SlotOutOfRange(slot))?;
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        let old_id = record.id();
        record.reset(id);
        self.total_recycled.fetch_add(1, Ordering::Relaxed);
        debug!("Recycled slot {}: fruit {} -> {}", slot, old_id, id);
        Ok(id)
    }

    /// Id the next recycled slot will take
    pub fn next_id(&self) -> i64 {
        self.next_id.load(Ordering::Acquire)
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Total slots recycled since the last populate/reset
    pub fn total_recycled(&self) -> usize {
        self.total_recycled.load(Ordering::Relaxed)
    }

    /// Iterate over the records in slot order
    pub fn iter(&self) -> impl Iterator<Item = &FruitRecord> {
        self.slots.iter()
    }

    /// Copy every record
    pub fn snapshot(&self) -> Vec<FruitSnapshot> {
        self.slots.iter().map(FruitRecord::snapshot).collect()
    }

    /// Report slots whose state changed since the previous scan
    pub fn scan_transitions(&self) -> Vec<Transition> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, record)| {
                record.observe().map(|(from, to)| Transition {
                    slot,
                    id: record.id(),
                    from,
                    to,
                })
            })
            .collect()
    }
}

impl Default for FruitPool {
    fn default() -> Self {
        Self::with_default_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_initialize_assigns_sequential_ids() {
        let pool = FruitPool::initialize(3, 5);

        let ids: Vec<i64> = pool.iter().map(FruitRecord::id).collect();
        assert_eq!(ids, vec![3, 4, 5, 6, 7]);
        assert_eq!(pool.next_id(), 8);
        assert!(pool.iter().all(|r| r.state() == FruitState::NotEngaged));
    }

    #[test]
    fn test_find() {
        let pool = FruitPool::initialize(10, 5);
        assert_eq!(pool.find(12), Some(2));
        assert_eq!(pool.find(15), None);
        assert!(pool.find_record(9).is_none());
    }

    #[test]
    fn test_recycle_takes_next_id() {
        let pool = FruitPool::initialize(0, 5);
        let slot = pool.find(0).unwrap();
        pool.record(slot).unwrap().set_sorting_type(1);

        let new_id = pool.recycle(slot).unwrap();
        assert_eq!(new_id, 5);
        assert_eq!(pool.next_id(), 6);
        assert_eq!(pool.find(5), Some(slot));
        assert_eq!(pool.find(0), None);
        assert_eq!(pool.record(slot).unwrap().sorting_type(), 0);
        assert_eq!(pool.total_recycled(), 1);
    }

    #[test]
    fn test_recycle_out_of_range() {
        let pool = FruitPool::with_default_size();
        assert_eq!(pool.recycle(5), Err(PoolError::SlotOutOfRange(5)));
    }

    #[test]
    fn test_reset_returns_to_zero_state() {
        let pool = FruitPool::initialize(40, 5);
        pool.record(1).unwrap().advance(FruitState::InputEntered).unwrap();
        pool.recycle(0).unwrap();

        pool.reset();
        assert_eq!(pool.next_id(), 0);
        assert!(pool.snapshot().iter().all(|s| *s == FruitSnapshot::default()));
    }

    #[test]
    fn test_scan_transitions() {
        let pool = FruitPool::initialize(1, 5);
        assert!(pool.scan_transitions().is_empty());

        pool.record(2).unwrap().advance(FruitState::InputEntered).unwrap();
        let transitions = pool.scan_transitions();
        assert_eq!(
            transitions,
            vec![Transition {
                slot: 2,
                id: 3,
                from: FruitState::NotEngaged,
                to: FruitState::InputEntered,
            }]
        );
        assert!(pool.scan_transitions().is_empty());
    }

    proptest! {
        #[test]
        fn prop_recycled_ids_never_repeat(start in -1000i64..1000, slots in proptest::collection::vec(0usize..5, 1..60)) {
            let pool = FruitPool::initialize(start, 5);
            let mut seen: HashSet<i64> = pool.iter().map(FruitRecord::id).collect();

            for slot in slots {
                let before = pool.next_id();
                let id = pool.recycle(slot).unwrap();
                prop_assert_eq!(id, before);
                prop_assert!(pool.next_id() > before);
                prop_assert!(seen.insert(id));
            }

            let live: HashSet<i64> = pool.iter().map(FruitRecord::id).collect();
            prop_assert_eq!(live.len(), pool.capacity());
        }
    }
}
