//! Simulated line driver
//!
//! Stands in for the real drivers when no hardware is attached, and lets
//! tests toggle trigger sensors and inspect every actuation.

use crate::{HardwareError, LineGeometry, LineHardware, Sensor};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU16, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// Poll interval while a simulated contact switch is held open
const SWITCH_POLL: Duration = Duration::from_millis(1);

/// One command issued to the simulated actuators
#[derive(Debug, Clone, PartialEq)]
pub enum Actuation {
    Conveyor(u8),
    GripperGrip,
    GripperRelease { all_the_way: bool },
    GripperRotate(f32),
    GripperHome,
    ProbeAttach,
    ProbeDetach { fully: bool },
    BinAngle(u16),
    GateOpen,
    GateClose,
}

/// In-memory line driver
pub struct SimulatedLine {
    geometry: LineGeometry,
    /// Trigger levels, indexed by [`Sensor::index`]
    triggers: [AtomicBool; 3],
    conveyor_speed: AtomicU8,
    gate_angle: AtomicU16,
    bin_angle: AtomicU16,
    /// Gripper stepper position in steps from home
    gripper_steps: AtomicI64,
    /// When set, contact switches never close
    switches_stuck: AtomicBool,
    /// Every actuation in issue order
    log: Mutex<Vec<Actuation>>,
}

impl SimulatedLine {
    /// Create a simulated line with instant contact switches
    pub fn new(geometry: LineGeometry) -> Self {
        info!("Creating simulated line driver");
        Self {
            gate_angle: AtomicU16::new(geometry.gate_open_deg),
            bin_angle: AtomicU16::new(geometry.bin_center_deg),
            geometry,
            triggers: [AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false)],
            conveyor_speed: AtomicU8::new(0),
            gripper_steps: AtomicI64::new(0),
            switches_stuck: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Set a trigger level
    pub fn set_trigger(&self, sensor: Sensor, blocked: bool) {
        self.triggers[sensor.index()].store(blocked, Ordering::Release);
    }

    /// Hold every contact switch open (simulates a stuck switch)
    pub fn set_switches_stuck(&self, stuck: bool) {
        self.switches_stuck.store(stuck, Ordering::Release);
    }

    pub fn conveyor_speed(&self) -> u8 {
        self.conveyor_speed.load(Ordering::Acquire)
    }

    pub fn gate_angle(&self) -> u16 {
        self.gate_angle.load(Ordering::Acquire)
    }

    pub fn bin_angle(&self) -> u16 {
        self.bin_angle.load(Ordering::Acquire)
    }

    /// Gripper stepper position in steps from home
    pub fn gripper_steps(&self) -> i64 {
        self.gripper_steps.load(Ordering::Acquire)
    }

    /// Copy of every actuation so far
    pub fn actuations(&self) -> Vec<Actuation> {
        self.log().clone()
    }

    /// Drain the actuation log
    pub fn take_actuations(&self) -> Vec<Actuation> {
        std::mem::take(&mut *self.log())
    }

    /// Count actuations matching a predicate
    pub fn count(&self, pred: impl Fn(&Actuation) -> bool) -> usize {
        self.log().iter().filter(|a| pred(a)).count()
    }

    fn log(&self) -> MutexGuard<'_, Vec<Actuation>> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, actuation: Actuation) {
        debug!("Actuation {:?}", actuation);
        self.log().push(actuation);
    }

    async fn wait_for_switch(&self) {
        while self.switches_stuck.load(Ordering::Acquire) {
            tokio::time::sleep(SWITCH_POLL).await;
        }
    }
}

impl Default for SimulatedLine {
    fn default() -> Self {
        Self::new(LineGeometry::default())
    }
}

#[async_trait]
impl LineHardware for SimulatedLine {
    fn read_trigger(&self, sensor: Sensor) -> bool {
        self.triggers[sensor.index()].load(Ordering::Acquire)
    }

    fn set_conveyor(&self, speed: u8) {
        let speed = speed.min(100);
        self.conveyor_speed.store(speed, Ordering::Release);
        self.record(Actuation::Conveyor(speed));
    }

    async fn gripper_grip(&self) -> Result<(), HardwareError> {
        self.record(Actuation::GripperGrip);
        self.wait_for_switch().await;
        Ok(())
    }

    fn gripper_release(&self, all_the_way: bool) {
        self.record(Actuation::GripperRelease { all_the_way });
    }

    async fn gripper_rotate(&self, degrees: f32) -> Result<(), HardwareError> {
        self.record(Actuation::GripperRotate(degrees));
        let steps = self.geometry.steps_for(degrees);
        self.gripper_steps.fetch_add(steps, Ordering::AcqRel);
        Ok(())
    }

    async fn gripper_home(&self) -> Result<(), HardwareError> {
        self.record(Actuation::GripperHome);
        self.wait_for_switch().await;
        self.gripper_steps.store(0, Ordering::Release);
        Ok(())
    }

    async fn probe_attach(&self) -> Result<(), HardwareError> {
        self.record(Actuation::ProbeAttach);
        self.wait_for_switch().await;
        Ok(())
    }

    fn probe_detach(&self, fully: bool) {
        self.record(Actuation::ProbeDetach { fully });
    }

    fn set_bin_angle(&self, degrees: u16) {
        let degrees = degrees.min(180);
        // The sorting stage re-commands the bin every tick; only log moves.
        if self.bin_angle.swap(degrees, Ordering::AcqRel) != degrees {
            self.record(Actuation::BinAngle(degrees));
        }
    }

    fn gate_open(&self) {
        self.gate_angle.store(self.geometry.gate_open_deg, Ordering::Release);
        self.record(Actuation::GateOpen);
    }

    fn gate_close(&self) {
        self.gate_angle.store(self.geometry.gate_close_deg, Ordering::Release);
        self.record(Actuation::GateClose);
    }
}
