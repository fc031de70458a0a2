//! Measure stage: centers each fruit under the probe and collects one
//! host-confirmed spectral reading per measurement point.

use crate::context::PipelineContext;
use crate::edge::{Edge, EdgeDetector};
use crate::gripper;
use fruit_pool::{FruitRecord, StageCursor};
use line_hardware::Sensor;
use sorter_protocol::{FruitState, NO_PAYLOAD};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Measure stage states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureState {
    WaitTrigger,
    Centering,
    MeasuringSpectral,
}

/// Measurement station coordinator
pub struct MeasureStage {
    ctx: PipelineContext,
    cursor: StageCursor,
    state: MeasureState,
    edge: EdgeDetector,
    /// Time the current fruit reached the measure sensor
    centering_since: Option<Instant>,
}

impl MeasureStage {
    pub fn new(ctx: PipelineContext) -> Self {
        let cursor = StageCursor::new(ctx.preset.initial_id);
        Self {
            ctx,
            cursor,
            state: MeasureState::WaitTrigger,
            edge: EdgeDetector::new(),
            centering_since: None,
        }
    }

    pub fn state(&self) -> MeasureState {
        self.state
    }

    pub fn cursor_id(&self) -> i64 {
        self.cursor.id()
    }

    /// One iteration of the state machine.
    ///
    /// In `MeasuringSpectral` this runs the whole point loop and only
    /// returns once the fruit is `MeasurePassed`.
    pub async fn step(&mut self) {
        let level = self.ctx.hardware.read_trigger(Sensor::Measure);
        let edge = self.edge.update(level);
        let pool = self.ctx.pool.clone();

        match self.state {
            MeasureState::WaitTrigger => {
                if edge != Edge::Rising {
                    return;
                }

                let Some(fruit) = self.cursor.resolve(&pool) else {
                    debug!("Measure sensor triggered, fruit {} not in pool", self.cursor.id());
                    return;
                };

                if fruit.state() != FruitState::InputPassed {
                    debug!(
                        "Measure sensor triggered while fruit {} is {}, ignored",
                        fruit.id(),
                        fruit.state()
                    );
                    return;
                }

                if let Err(e) = fruit.advance(FruitState::MeasureEntered) {
                    warn!("Measure stage: {}", e);
                    return;
                }
                self.ctx.emit(fruit.id(), FruitState::MeasureEntered, NO_PAYLOAD);
                self.centering_since = Some(Instant::now());
                self.state = MeasureState::Centering;
            }

            MeasureState::Centering => {
                let Some(fruit) = self.cursor.resolve(&pool) else {
                    warn!("Fruit {} vanished while centering", self.cursor.id());
                    self.state = MeasureState::WaitTrigger;
                    return;
                };

                let since = *self.centering_since.get_or_insert_with(Instant::now);
                if since.elapsed().as_millis() * 2 < fruit.diameter_ms() as u128 {
                    return;
                }

                self.ctx.hardware.set_conveyor(0);
                if let Err(e) = fruit.advance(FruitState::MeasureProcessing) {
                    warn!("Measure stage: {}", e);
                }
                self.ctx.emit(fruit.id(), FruitState::MeasureProcessing, NO_PAYLOAD);
                self.centering_since = None;
                self.state = MeasureState::MeasuringSpectral;
                debug!("Fruit {} centered after {:?}", fruit.id(), since.elapsed());
            }

            MeasureState::MeasuringSpectral => {
                let Some(fruit) = self.cursor.resolve(&pool) else {
                    warn!("Fruit {} vanished before measurement", self.cursor.id());
                    self.state = MeasureState::WaitTrigger;
                    return;
                };

                self.measure_points(fruit).await;
                self.release(fruit).await;

                self.cursor.advance(&pool);
                self.state = MeasureState::WaitTrigger;
            }
        }
    }

    async fn measure_points(&self, fruit: &FruitRecord) {
        let hw = &self.ctx.hardware;
        let count = self.ctx.preset.measure_point_count;

        for point in 1..=count {
            fruit.begin_point(point);
            gripper::position_fruit(&self.ctx, point).await;
            self.ctx.actuate("probe attach", hw.probe_attach()).await;

            // The host replies with the same line once its scan is done.
            self.ctx
                .emit(fruit.id(), FruitState::MeasureProcessing, point as i32);
            self.wait_for_ack(fruit, point).await;

            hw.probe_detach(point == count);
        }
    }

    async fn wait_for_ack(&self, fruit: &FruitRecord, point: u32) {
        let poll = self.ctx.settings.timing.ack_poll();
        let deadline = self
            .ctx
            .settings
            .host_ack_timeout()
            .map(|limit| Instant::now() + limit);

        while !fruit.point_measure_done() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    "No host acknowledgment for fruit {} point {}, moving on",
                    fruit.id(),
                    point
                );
                return;
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn release(&self, fruit: &FruitRecord) {
        let hw = &self.ctx.hardware;

        hw.gripper_release(true);
        self.ctx.actuate("gripper home", hw.gripper_home()).await;
        hw.set_conveyor(self.ctx.preset.conveyor_speed);
        hw.gate_open();

        if let Err(e) = fruit.advance(FruitState::MeasurePassed) {
            warn!("Measure stage: {}", e);
        }
        // Cue for the host to classify the fruit.
        self.ctx.emit(fruit.id(), FruitState::MeasurePassed, NO_PAYLOAD);
        info!("Fruit {} measured at {} points", fruit.id(), fruit.point_measured());
    }

    /// Run until the task is aborted
    pub async fn run(mut self) {
        info!("Measure stage started at fruit {}", self.cursor.id());
        let tick = self.ctx.settings.timing.measure_tick();
        loop {
            self.step().await;
            tokio::time::sleep(tick).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineSettings;
    use crate::testing::{wait_until, Fixture};
    use line_hardware::Actuation;
    use sorter_protocol::TelemetryMessage;
    use std::time::Duration;

    fn pass_input(fx: &Fixture, id: i64, diameter_ms: u32) {
        let fruit = fx.ctx.pool.find_record(id).unwrap();
        fruit.advance(FruitState::InputEntered).unwrap();
        fruit.set_diameter_ms(diameter_ms);
        fruit.advance(FruitState::InputPassed).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_centering_waits_half_the_transit_time() {
        let mut fx = Fixture::new(1, 4);
        pass_input(&fx, 1, 100);
        let mut stage = MeasureStage::new(fx.ctx.clone());

        fx.line.set_trigger(Sensor::Measure, true);
        stage.step().await;
        assert_eq!(stage.state(), MeasureState::Centering);

        tokio::time::advance(Duration::from_millis(30)).await;
        stage.step().await;
        assert_eq!(stage.state(), MeasureState::Centering);
        assert_eq!(fx.line.count(|a| *a == Actuation::Conveyor(0)), 0);

        tokio::time::advance(Duration::from_millis(20)).await;
        stage.step().await;
        assert_eq!(stage.state(), MeasureState::MeasuringSpectral);
        assert_eq!(fx.line.actuations(), vec![Actuation::Conveyor(0)]);
        assert_eq!(
            fx.ctx.pool.find_record(1).unwrap().state(),
            FruitState::MeasureProcessing
        );
        assert_eq!(
            fx.drain_telemetry(),
            vec![
                TelemetryMessage::bare(1, FruitState::MeasureEntered),
                TelemetryMessage::bare(1, FruitState::MeasureProcessing),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_ignored_until_input_passed() {
        let mut fx = Fixture::new(1, 4);
        let mut stage = MeasureStage::new(fx.ctx.clone());

        fx.line.set_trigger(Sensor::Measure, true);
        stage.step().await;
        assert_eq!(stage.state(), MeasureState::WaitTrigger);
        assert!(fx.drain_telemetry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_twelve_points_each_acknowledged() {
        let fx = Fixture::new(1, 12);
        pass_input(&fx, 1, 20);
        let Fixture { ctx, line, mut telemetry } = fx;

        let host = {
            let pool = ctx.pool.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                loop {
                    for msg in telemetry.next_batch().await {
                        seen.push(msg);
                        match (msg.state, msg.payload) {
                            (FruitState::MeasureProcessing, point) if point > 0 => {
                                pool.find_record(msg.fruit_id).unwrap().acknowledge_point();
                            }
                            (FruitState::MeasurePassed, _) => return seen,
                            _ => {}
                        }
                    }
                }
            })
        };

        let stage = tokio::spawn(MeasureStage::new(ctx.clone()).run());
        line.set_trigger(Sensor::Measure, true);

        let seen = tokio::time::timeout(Duration::from_secs(10), host)
            .await
            .unwrap()
            .unwrap();
        stage.abort();

        let points: Vec<i32> = seen
            .iter()
            .filter(|m| m.state == FruitState::MeasureProcessing && m.payload > 0)
            .map(|m| m.payload)
            .collect();
        assert_eq!(points, (1..=12).collect::<Vec<i32>>());
        assert_eq!(seen.first(), Some(&TelemetryMessage::bare(1, FruitState::MeasureEntered)));
        assert_eq!(seen.last(), Some(&TelemetryMessage::bare(1, FruitState::MeasurePassed)));

        assert_eq!(line.count(|a| *a == Actuation::ProbeAttach), 12);
        assert_eq!(line.count(|a| *a == Actuation::ProbeDetach { fully: false }), 11);
        assert_eq!(line.count(|a| *a == Actuation::ProbeDetach { fully: true }), 1);
        // Quarter resets at points 4, 7 and 10, plus the final release.
        assert_eq!(line.count(|a| *a == Actuation::GripperHome), 4);
        assert_eq!(line.count(|a| *a == Actuation::GripperGrip), 4);
        assert_eq!(line.count(|a| *a == Actuation::GripperRotate(70.0)), 3);
        assert_eq!(line.count(|a| *a == Actuation::GripperRotate(10.0)), 8);
        assert_eq!(line.gate_angle(), 90);
        assert_eq!(line.conveyor_speed(), 60);
        assert_eq!(line.gripper_steps(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_until_host_acknowledges() {
        let fx = Fixture::new(3, 4);
        pass_input(&fx, 3, 10);
        let stage = tokio::spawn(MeasureStage::new(fx.ctx.clone()).run());
        fx.line.set_trigger(Sensor::Measure, true);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let fruit = fx.ctx.pool.find_record(3).unwrap();
        assert_eq!(fruit.state(), FruitState::MeasureProcessing);
        assert_eq!(fruit.point_measured(), 1);
        assert_eq!(fx.line.count(|a| *a == Actuation::ProbeAttach), 1);

        fruit.acknowledge_point();
        wait_until(|| fruit.point_measured() == 2).await;
        assert!(!fruit.point_measure_done());
        stage.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_timeout_lets_measurement_finish() {
        let settings = PipelineSettings {
            host_ack_timeout_ms: Some(50),
            ..Default::default()
        };
        let fx = Fixture::with_settings(1, 4, settings);
        pass_input(&fx, 1, 10);
        let stage = tokio::spawn(MeasureStage::new(fx.ctx.clone()).run());
        fx.line.set_trigger(Sensor::Measure, true);

        let fruit = fx.ctx.pool.find_record(1).unwrap();
        wait_until(|| fruit.state() == FruitState::MeasurePassed).await;
        assert_eq!(fx.line.count(|a| *a == Actuation::ProbeAttach), 4);
        stage.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_actuator_timeout_frees_stuck_probe() {
        let settings = PipelineSettings {
            actuator_timeout_ms: Some(100),
            host_ack_timeout_ms: Some(10),
            ..Default::default()
        };
        let fx = Fixture::with_settings(1, 4, settings);
        fx.line.set_switches_stuck(true);
        pass_input(&fx, 1, 10);
        let stage = tokio::spawn(MeasureStage::new(fx.ctx.clone()).run());
        fx.line.set_trigger(Sensor::Measure, true);

        let fruit = fx.ctx.pool.find_record(1).unwrap();
        wait_until(|| fruit.state() == FruitState::MeasurePassed).await;
        stage.abort();
    }
}
