//! Sorting Line Hardware Capabilities
//!
//! Capability interface consumed by the line stages. Pulse timing, PWM duty
//! cycles and pin setup stay inside the drivers; stages only see:
//! - boolean trigger sensors (input, measure, sorting)
//! - conveyor speed in percent
//! - gripper: pneumatic grip/release plus a homing rotary stepper
//! - probe: pneumatic extend/mid/retract with a contact switch
//! - sort-bin and gate servos

pub mod simulated;

pub use simulated::{Actuation, SimulatedLine};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hardware error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareError {
    #[error("{action} did not complete within {timeout_ms}ms")]
    Timeout { action: &'static str, timeout_ms: u64 },
}

/// Trigger sensors along the line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    /// Diameter timing sensor at the line entry
    Input,
    /// Sensor in front of the measurement station
    Measure,
    /// Sensor in front of the sort bin
    Sorting,
}

impl Sensor {
    pub fn index(&self) -> usize {
        match self {
            Sensor::Input => 0,
            Sensor::Measure => 1,
            Sensor::Sorting => 2,
        }
    }
}

/// Capability interface of the line drivers.
///
/// Methods returning futures block until the physical motion is confirmed
/// (contact switch closed, homing switch reached). They have no timeout of
/// their own.
#[async_trait]
pub trait LineHardware: Send + Sync {
    /// Sample a trigger sensor (`true` = beam blocked)
    fn read_trigger(&self, sensor: Sensor) -> bool;

    /// Run the conveyor at `speed` percent (0 stops it)
    fn set_conveyor(&self, speed: u8);

    /// Close the gripper and wait for both contact switches
    async fn gripper_grip(&self) -> Result<(), HardwareError>;

    /// Open the gripper; `all_the_way = false` leaves the valve at mid-position
    fn gripper_release(&self, all_the_way: bool);

    /// Rotate the gripper stepper by a relative angle
    async fn gripper_rotate(&self, degrees: f32) -> Result<(), HardwareError>;

    /// Drive the gripper stepper to its homing switch
    async fn gripper_home(&self) -> Result<(), HardwareError>;

    /// Extend the probe and wait for its contact switch
    async fn probe_attach(&self) -> Result<(), HardwareError>;

    /// Retract the probe; `fully = false` stops at the mid-position
    fn probe_detach(&self, fully: bool);

    /// Move the sort-bin servo to an absolute angle
    fn set_bin_angle(&self, degrees: u16);

    fn gate_open(&self);

    fn gate_close(&self);
}

/// Mechanical constants of the line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineGeometry {
    /// Gripper rotation between two measurement points (degrees)
    pub step_angle_deg: f32,
    /// Gate servo angle when open
    pub gate_open_deg: u16,
    /// Gate servo angle when closed
    pub gate_close_deg: u16,
    /// Bin servo angle for sorting type 1
    pub bin_type_1_deg: u16,
    /// Bin servo angle for sorting type 2
    pub bin_type_2_deg: u16,
    /// Bin servo resting angle
    pub bin_center_deg: u16,
    /// Gripper stepper resolution
    pub stepper_steps_per_rev: u32,
}

impl Default for LineGeometry {
    fn default() -> Self {
        Self {
            step_angle_deg: 10.0,
            gate_open_deg: 90,
            gate_close_deg: 180,
            bin_type_1_deg: 0,
            bin_type_2_deg: 180,
            bin_center_deg: 90,
            stepper_steps_per_rev: 800,
        }
    }
}

impl LineGeometry {
    /// Bin angle for a sorting type, `None` when unclassified or unknown
    pub fn bin_angle(&self, sorting_type: u8) -> Option<u16> {
        match sorting_type {
            1 => Some(self.bin_type_1_deg),
            2 => Some(self.bin_type_2_deg),
            _ => None,
        }
    }

    /// Stepper steps for a rotation, truncated toward zero
    pub fn steps_for(&self, degrees: f32) -> i64 {
        (degrees / 360.0 * self.stepper_steps_per_rev as f32) as i64
    }
}
