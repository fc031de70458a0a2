//! Fruit State Definitions
//!
//! Defines the fixed progression a fruit goes through on the line and the
//! names used for each state on the wire.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position of a fruit in the line progression
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum FruitState {
    /// Slot is waiting for a fruit at the input sensor
    #[default]
    NotEngaged = 0,
    /// Fruit is blocking the input sensor
    InputEntered = 1,
    /// Fruit cleared the input sensor, diameter known
    InputPassed = 2,
    /// Fruit reached the measurement sensor
    MeasureEntered = 3,
    /// Fruit is centered and being probed
    MeasureProcessing = 4,
    /// All points measured, waiting for classification
    MeasurePassed = 5,
    /// Fruit dropped into its bin
    SortingPassed = 6,
}

impl FruitState {
    /// All states in progression order
    pub const ALL: [FruitState; 7] = [
        FruitState::NotEngaged,
        FruitState::InputEntered,
        FruitState::InputPassed,
        FruitState::MeasureEntered,
        FruitState::MeasureProcessing,
        FruitState::MeasurePassed,
        FruitState::SortingPassed,
    ];

    /// Get the raw discriminant
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Decode a raw discriminant
    pub fn from_u8(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Name used for this state on the wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            FruitState::NotEngaged => "NOT_ENGAGED",
            FruitState::InputEntered => "INPUT_ENTERED",
            FruitState::InputPassed => "INPUT_PASSED",
            FruitState::MeasureEntered => "MEASURE_ENTERED",
            FruitState::MeasureProcessing => "MEASURE_PROCESSING",
            FruitState::MeasurePassed => "MEASURE_PASSED",
            FruitState::SortingPassed => "SORTING_PASSED",
        }
    }

    /// The state that must follow this one, if any
    pub fn next(&self) -> Option<Self> {
        Self::from_u8(self.as_u8() + 1)
    }

    /// Parse a state name, ignoring case and underscores.
    ///
    /// Accepts both `MEASURE_PASSED` and `MeasurePassed`.
    pub fn from_wire(name: &str) -> Option<Self> {
        let wanted = normalize(name);
        Self::ALL
            .into_iter()
            .find(|state| normalize(state.wire_name()) == wanted)
    }
}

fn normalize(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for FruitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for FruitState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s).ok_or_else(|| ProtocolError::UnknownState(s.to_string()))
    }
}
