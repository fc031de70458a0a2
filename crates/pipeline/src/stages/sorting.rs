//! Sorting stage: drops classified fruits into their bin and recycles slots

use crate::context::PipelineContext;
use crate::edge::{Edge, EdgeDetector};
use fruit_pool::StageCursor;
use line_hardware::Sensor;
use metrics::counter;
use sorter_protocol::FruitState;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sorting station coordinator (single `WaitTrigger` state)
pub struct SortingStage {
    ctx: PipelineContext,
    cursor: StageCursor,
    edge: EdgeDetector,
}

impl SortingStage {
    pub fn new(ctx: PipelineContext) -> Self {
        let cursor = StageCursor::new(ctx.preset.initial_id);
        Self {
            ctx,
            cursor,
            edge: EdgeDetector::new(),
        }
    }

    pub fn cursor_id(&self) -> i64 {
        self.cursor.id()
    }

    /// Sample the sensor once. Returns how long to sleep before the next tick.
    pub fn tick(&mut self) -> Duration {
        let timing = &self.ctx.settings.timing;
        let level = self.ctx.hardware.read_trigger(Sensor::Sorting);
        let edge = self.edge.update(level);
        let pool = self.ctx.pool.clone();

        let Some(fruit) = self.cursor.resolve(&pool) else {
            if edge == Edge::Rising {
                warn!("Sorting sensor triggered, fruit {} not in pool", self.cursor.id());
            }
            return timing.idle_wait();
        };

        let sorting_type = fruit.sorting_type();
        let wait = match self.ctx.settings.geometry.bin_angle(sorting_type) {
            Some(angle) => {
                self.ctx.hardware.set_bin_angle(angle);
                timing.sorting_tick()
            }
            None => timing.idle_wait(),
        };

        if edge != Edge::Rising {
            return wait;
        }

        let id = fruit.id();
        if fruit.state() != FruitState::MeasurePassed {
            warn!("Sorting sensor triggered while fruit {} is {}, edge consumed", id, fruit.state());
            return wait;
        }
        if sorting_type == 0 {
            warn!("Fruit {} reached the bin before classification", id);
        }

        if let Err(e) = fruit.advance(FruitState::SortingPassed) {
            warn!("Sorting stage: {}", e);
            return wait;
        }
        self.ctx.emit(id, FruitState::SortingPassed, sorting_type as i32);

        if let Some(slot) = self.cursor.slot() {
            match pool.recycle(slot) {
                Ok(new_id) => debug!("Fruit {} done, slot {} now holds {}", id, slot, new_id),
                Err(e) => warn!("Sorting stage: {}", e),
            }
        }
        counter!("sorter_fruits_sorted_total").increment(1);
        info!("Fruit {} sorted as type {}", id, sorting_type);

        self.cursor.advance(&pool);
        wait
    }

    /// Run until the task is aborted
    pub async fn run(mut self) {
        info!("Sorting stage started at fruit {}", self.cursor.id());
        loop {
            let wait = self.tick();
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use line_hardware::Actuation;
    use sorter_protocol::TelemetryMessage;

    fn pass_measure(fx: &Fixture, id: i64) {
        let fruit = fx.ctx.pool.find_record(id).unwrap();
        for state in &FruitState::ALL[1..=5] {
            fruit.advance(*state).unwrap();
        }
    }

    #[tokio::test]
    async fn test_sorts_and_recycles() {
        let mut fx = Fixture::new(1, 4);
        pass_measure(&fx, 1);
        fx.ctx.pool.find_record(1).unwrap().set_sorting_type(2);
        let mut stage = SortingStage::new(fx.ctx.clone());

        assert_eq!(stage.tick(), fx.ctx.settings.timing.sorting_tick());
        assert_eq!(fx.line.bin_angle(), 180);

        fx.line.set_trigger(Sensor::Sorting, true);
        stage.tick();

        assert_eq!(
            fx.drain_telemetry(),
            vec![TelemetryMessage::new(1, FruitState::SortingPassed, 2)]
        );
        assert_eq!(stage.cursor_id(), 2);
        assert!(fx.ctx.pool.find(1).is_none());

        let reused = fx.ctx.pool.find_record(6).unwrap();
        assert_eq!(reused.state(), FruitState::NotEngaged);
        assert_eq!(reused.sorting_type(), 0);
        assert_eq!(fx.ctx.pool.next_id(), 7);
        assert_eq!(fx.line.actuations(), vec![Actuation::BinAngle(180)]);
    }

    #[tokio::test]
    async fn test_unclassified_fruit_idles() {
        let fx = Fixture::new(1, 4);
        pass_measure(&fx, 1);
        let mut stage = SortingStage::new(fx.ctx.clone());

        assert_eq!(stage.tick(), fx.ctx.settings.timing.idle_wait());
        assert!(fx.line.actuations().is_empty());
    }

    #[tokio::test]
    async fn test_early_edge_is_consumed() {
        let mut fx = Fixture::new(1, 4);
        let fruit = fx.ctx.pool.find_record(1).unwrap();
        fruit.advance(FruitState::InputEntered).unwrap();
        fruit.advance(FruitState::InputPassed).unwrap();
        let mut stage = SortingStage::new(fx.ctx.clone());

        fx.line.set_trigger(Sensor::Sorting, true);
        stage.tick();
        assert_eq!(fruit.state(), FruitState::InputPassed);

        for state in &FruitState::ALL[3..=5] {
            fruit.advance(*state).unwrap();
        }
        fruit.set_sorting_type(1);

        // Sensor still blocked: no new edge.
        stage.tick();
        assert_eq!(fruit.state(), FruitState::MeasurePassed);
        assert_eq!(stage.cursor_id(), 1);

        fx.line.set_trigger(Sensor::Sorting, false);
        stage.tick();
        fx.line.set_trigger(Sensor::Sorting, true);
        stage.tick();
        assert_eq!(
            fx.drain_telemetry(),
            vec![TelemetryMessage::new(1, FruitState::SortingPassed, 1)]
        );
        assert_eq!(stage.cursor_id(), 2);
    }

    #[tokio::test]
    async fn test_edge_without_fruit_is_ignored() {
        let mut fx = Fixture::new(1, 4);
        let mut stage = SortingStage::new(fx.ctx.clone());
        for _ in 0..5 {
            stage.cursor.advance(&fx.ctx.pool);
        }

        fx.line.set_trigger(Sensor::Sorting, true);
        assert_eq!(stage.tick(), fx.ctx.settings.timing.idle_wait());
        assert!(fx.drain_telemetry().is_empty());
        assert_eq!(stage.cursor_id(), 6);
    }
}
