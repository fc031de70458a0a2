//! Stage coordinators
//!
//! Each stage is an independent state machine with its own cursor into the
//! fruit pool. A stage runs as an unbounded loop that sleeps a short tick
//! every iteration and is only ever stopped by aborting its task.

mod input;
mod measure;
mod sorting;

pub use input::{InputStage, InputState};
pub use measure::{MeasureStage, MeasureState};
pub use sorting::SortingStage;
