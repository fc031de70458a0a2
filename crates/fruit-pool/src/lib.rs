//! Fruit Pool
//!
//! Provides the fixed-size arena of fruit records shared by the line stages.
//! Every field of a record is an atomic cell with a single writing task, so
//! stages and the host link can touch the same slot without locks.

mod cursor;
mod pool;
mod record;

pub use cursor::StageCursor;
pub use pool::{FruitPool, SlotIndex, Transition, DEFAULT_POOL_SIZE};
pub use record::FruitRecord;

use serde::{Deserialize, Serialize};
use sorter_protocol::FruitState;
use thiserror::Error;

/// Pool error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Slot {0} is out of range")]
    SlotOutOfRange(SlotIndex),

    #[error("Fruit {id} cannot move from {from} to {to}")]
    OutOfOrder {
        id: i64,
        from: FruitState,
        to: FruitState,
    },
}

/// Point-in-time copy of a record (for logging and tests)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FruitSnapshot {
    pub id: i64,
    pub state: FruitState,
    pub previous_state: FruitState,
    pub diameter_ms: u32,
    pub sorting_type: u8,
    pub point_measured: u32,
    pub point_measure_done: bool,
}
