//! Input stage: times each fruit across the input sensor

use crate::context::PipelineContext;
use crate::edge::{Edge, EdgeDetector};
use fruit_pool::StageCursor;
use line_hardware::Sensor;
use sorter_protocol::{FruitState, NO_PAYLOAD};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Input stage states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    WaitTrigger,
    MeasuringDiameter,
}

/// Diameter timing at the line entry.
///
/// A fruit that blocks the sensor for less than one tick is never seen.
pub struct InputStage {
    ctx: PipelineContext,
    cursor: StageCursor,
    state: InputState,
    edge: EdgeDetector,
    /// Time the current fruit started blocking the sensor
    entered_at: Option<Instant>,
}

impl InputStage {
    pub fn new(ctx: PipelineContext) -> Self {
        let cursor = StageCursor::new(ctx.preset.initial_id);
        Self {
            ctx,
            cursor,
            state: InputState::WaitTrigger,
            edge: EdgeDetector::new(),
            entered_at: None,
        }
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    pub fn cursor_id(&self) -> i64 {
        self.cursor.id()
    }

    /// Sample the sensor once and advance the state machine
    pub fn tick(&mut self) {
        let level = self.ctx.hardware.read_trigger(Sensor::Input);
        let edge = self.edge.update(level);
        let pool = self.ctx.pool.clone();

        match self.state {
            InputState::WaitTrigger => {
                if edge != Edge::Rising {
                    return;
                }

                let Some(fruit) = self.cursor.resolve(&pool) else {
                    warn!("Fruit at input but no free slot for id {}, fruit not tracked", self.cursor.id());
                    return;
                };

                if fruit.state() != FruitState::NotEngaged {
                    return;
                }

                if let Err(e) = fruit.advance(FruitState::InputEntered) {
                    warn!("Input stage: {}", e);
                    return;
                }
                self.ctx.emit(fruit.id(), FruitState::InputEntered, NO_PAYLOAD);
                self.entered_at = Some(Instant::now());
                self.state = InputState::MeasuringDiameter;
                debug!("Fruit {} entered input", fruit.id());
            }

            InputState::MeasuringDiameter => {
                if edge != Edge::Falling {
                    return;
                }

                let diameter_ms = self
                    .entered_at
                    .take()
                    .map(|t| t.elapsed().as_millis().min(u32::MAX as u128) as u32)
                    .unwrap_or(0);

                if let Some(fruit) = self.cursor.resolve(&pool) {
                    fruit.set_diameter_ms(diameter_ms);
                    match fruit.advance(FruitState::InputPassed) {
                        Ok(()) => {
                            self.ctx.emit(fruit.id(), FruitState::InputPassed, diameter_ms as i32);
                            debug!("Fruit {} passed input, diameter {}ms", fruit.id(), diameter_ms);
                        }
                        Err(e) => warn!("Input stage: {}", e),
                    }
                }

                self.ctx.hardware.gate_close();
                self.cursor.advance(&pool);
                self.state = InputState::WaitTrigger;
            }
        }
    }

    /// Run until the task is aborted
    pub async fn run(mut self) {
        info!("Input stage started at fruit {}", self.cursor.id());
        let tick = self.ctx.settings.timing.input_tick();
        loop {
            self.tick();
            tokio::time::sleep(tick).await;
        }
    }
}
