//! Per-run pipeline context

use crate::config::PipelineSettings;
use crate::telemetry::TelemetrySender;
use fruit_pool::FruitPool;
use line_hardware::{HardwareError, LineHardware};
use sorter_protocol::{FruitState, Preset, TelemetryMessage};
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Everything a stage task needs, created on handshake and dropped on stop
#[derive(Clone)]
pub struct PipelineContext {
    /// Shared fruit records
    pub pool: Arc<FruitPool>,
    /// Run parameters from the handshake
    pub preset: Preset,
    /// Telemetry producer handle
    pub telemetry: TelemetrySender,
    /// Line drivers
    pub hardware: Arc<dyn LineHardware>,
    /// Controller settings
    pub settings: Arc<PipelineSettings>,
}

impl PipelineContext {
    pub fn new(
        pool: Arc<FruitPool>,
        preset: Preset,
        telemetry: TelemetrySender,
        hardware: Arc<dyn LineHardware>,
        settings: Arc<PipelineSettings>,
    ) -> Self {
        Self {
            pool,
            preset,
            telemetry,
            hardware,
            settings,
        }
    }

    /// Report a transition to the host (best effort)
    pub fn emit(&self, fruit_id: i64, state: FruitState, payload: i32) {
        self.telemetry
            .send(TelemetryMessage::new(fruit_id, state, payload));
    }

    /// Run a blocking actuation, bounded by `actuator_timeout_ms` when set.
    ///
    /// Failures are logged and swallowed so the stage keeps going.
    pub async fn actuate<F>(&self, action: &'static str, motion: F)
    where
        F: Future<Output = Result<(), HardwareError>>,
    {
        let result = match self.settings.actuator_timeout() {
            Some(limit) => tokio::time::timeout(limit, motion).await.unwrap_or_else(|_| {
                Err(HardwareError::Timeout {
                    action,
                    timeout_ms: limit.as_millis() as u64,
                })
            }),
            None => motion.await,
        };

        if let Err(e) = result {
            warn!("{} failed: {}", action, e);
        }
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("preset", &self.preset)
            .field("pool_size", &self.pool.capacity())
            .finish_non_exhaustive()
    }
}
