//! Fruit Record

use crate::{FruitSnapshot, PoolError};
use sorter_protocol::FruitState;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU8, Ordering};

/// One physical fruit on the line.
///
/// Field ownership: the input stage writes `diameter_ms`, the measure stage
/// writes `point_measured` and clears `point_measure_done`, the host link
/// sets `point_measure_done` and `sorting_type`. `state` only moves forward
/// through [`FruitRecord::advance`].
#[derive(Debug)]
pub struct FruitRecord {
    id: AtomicI64,
    state: AtomicU8,
    previous_state: AtomicU8,
    diameter_ms: AtomicU32,
    sorting_type: AtomicU8,
    point_measured: AtomicU32,
    point_measure_done: AtomicBool,
}

impl FruitRecord {
    /// Create a record in the `NotEngaged` state
    pub fn new(id: i64) -> Self {
        Self {
            id: AtomicI64::new(id),
            state: AtomicU8::new(FruitState::NotEngaged.as_u8()),
            previous_state: AtomicU8::new(FruitState::NotEngaged.as_u8()),
            diameter_ms: AtomicU32::new(0),
            sorting_type: AtomicU8::new(0),
            point_measured: AtomicU32::new(0),
            point_measure_done: AtomicBool::new(false),
        }
    }

    /// Fruit id currently held by this slot
    pub fn id(&self) -> i64 {
        self.id.load(Ordering::Acquire)
    }

    /// Current state
    pub fn state(&self) -> FruitState {
        decode(self.state.load(Ordering::Acquire))
    }

    /// Last state seen by [`FruitRecord::observe`]
    pub fn previous_state(&self) -> FruitState {
        decode(self.previous_state.load(Ordering::Acquire))
    }

    /// Move to `to`, which must directly follow the current state.
    pub fn advance(&self, to: FruitState) -> Result<(), PoolError> {
        let expected = FruitState::ALL.into_iter().find(|s| s.next() == Some(to));

        let Some(from) = expected else {
            return Err(PoolError::OutOfOrder {
                id: self.id(),
                from: self.state(),
                to,
            });
        };

        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| PoolError::OutOfOrder {
                id: self.id(),
                from: decode(actual),
                to,
            })
    }

    /// Record the state as observed; returns `(previous, current)` if it changed.
    pub fn observe(&self) -> Option<(FruitState, FruitState)> {
        let current = self.state.load(Ordering::Acquire);
        let previous = self.previous_state.swap(current, Ordering::AcqRel);
        (previous != current).then(|| (decode(previous), decode(current)))
    }

    /// Transit time across the input sensor
    pub fn diameter_ms(&self) -> u32 {
        self.diameter_ms.load(Ordering::Acquire)
    }

    pub fn set_diameter_ms(&self, diameter_ms: u32) {
        self.diameter_ms.store(diameter_ms, Ordering::Release);
    }

    /// Classification from the host (0 = not yet classified)
    pub fn sorting_type(&self) -> u8 {
        self.sorting_type.load(Ordering::Acquire)
    }

    pub fn set_sorting_type(&self, sorting_type: u8) {
        self.sorting_type.store(sorting_type, Ordering::Release);
    }

    /// Point currently being measured (1-based, 0 before the first)
    pub fn point_measured(&self) -> u32 {
        self.point_measured.load(Ordering::Acquire)
    }

    /// Open a measurement point: store its number and clear the ack flag.
    pub fn begin_point(&self, point: u32) {
        self.point_measure_done.store(false, Ordering::Release);
        self.point_measured.store(point, Ordering::Release);
    }

    /// Host acknowledgment for the open point
    pub fn acknowledge_point(&self) {
        self.point_measure_done.store(true, Ordering::Release);
    }

    pub fn point_measure_done(&self) -> bool {
        self.point_measure_done.load(Ordering::Acquire)
    }

    /// Reset every field and take a new identity.
    ///
    /// The id is published last so a concurrent `find` never matches a
    /// half-reset slot under its new id.
    pub(crate) fn reset(&self, id: i64) {
        self.state.store(FruitState::NotEngaged.as_u8(), Ordering::Release);
        self.previous_state.store(FruitState::NotEngaged.as_u8(), Ordering::Release);
        self.diameter_ms.store(0, Ordering::Release);
        self.sorting_type.store(0, Ordering::Release);
        self.point_measured.store(0, Ordering::Release);
        self.point_measure_done.store(false, Ordering::Release);
        self.id.store(id, Ordering::Release);
    }

    /// Copy all fields
    pub fn snapshot(&self) -> FruitSnapshot {
        FruitSnapshot {
            id: self.id(),
            state: self.state(),
            previous_state: self.previous_state(),
            diameter_ms: self.diameter_ms(),
            sorting_type: self.sorting_type(),
            point_measured: self.point_measured(),
            point_measure_done: self.point_measure_done(),
        }
    }
}

impl Default for FruitRecord {
    fn default() -> Self {
        Self::new(0)
    }
}

fn decode(raw: u8) -> FruitState {
    FruitState::from_u8(raw).unwrap_or_default()
}
