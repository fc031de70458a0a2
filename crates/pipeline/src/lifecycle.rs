//! Lifecycle controller
//!
//! Owns the long-lived fruit pool and the host writer, and starts and stops
//! the per-run stage tasks:
//!
//! `Idle -> AwaitingHandshake -> Running -> Stopping -> AwaitingHandshake`
//!
//! A stop is a soft restart: the stage tasks are aborted, the pool is reset
//! and the controller waits for a new handshake.

use crate::audit;
use crate::config::PipelineSettings;
use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::stages::{InputStage, MeasureStage, SortingStage};
use crate::telemetry::{self, SharedWriter};
use fruit_pool::FruitPool;
use line_hardware::LineHardware;
use sorter_protocol::{status, LineWriter, Preset};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Controller phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Idle,
    AwaitingHandshake,
    Running,
    Stopping,
}

/// Tasks and context of one run
struct RunningPipeline {
    ctx: PipelineContext,
    tasks: JoinSet<()>,
}

/// Starts and stops the pipeline on behalf of the host link
pub struct Controller<W> {
    pool: Arc<FruitPool>,
    writer: SharedWriter<W>,
    hardware: Arc<dyn LineHardware>,
    settings: Arc<PipelineSettings>,
    phase: LifecyclePhase,
    running: Option<RunningPipeline>,
}

impl<W> Controller<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        writer: LineWriter<W>,
        hardware: Arc<dyn LineHardware>,
        settings: Arc<PipelineSettings>,
    ) -> Self {
        Self {
            pool: Arc::new(FruitPool::new(settings.pool_size)),
            writer: Arc::new(Mutex::new(writer)),
            hardware,
            settings,
            phase: LifecyclePhase::Idle,
            running: None,
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Fruit pool shared with the stage tasks
    pub fn pool(&self) -> &Arc<FruitPool> {
        &self.pool
    }

    /// Context of the current run, if running
    pub fn context(&self) -> Option<&PipelineContext> {
        self.running.as_ref().map(|run| &run.ctx)
    }

    /// Write a status line to the host
    pub async fn send_status(&self, text: &str) -> Result<(), PipelineError> {
        self.writer.lock().await.send_line(text).await?;
        Ok(())
    }

    /// Enter the handshake wait and prompt the host
    pub async fn await_handshake(&mut self) -> Result<(), PipelineError> {
        self.phase = LifecyclePhase::AwaitingHandshake;
        info!("Waiting for handshake");
        self.send_status(status::INITIALIZE).await
    }

    /// Tell the host its handshake line was rejected
    pub async fn report_handshake_failure(&self, line: &str) -> Result<(), PipelineError> {
        warn!("Invalid handshake: {:?}", line);
        self.send_status(status::INIT_FAILED).await
    }

    /// Populate the pool, drive the line to its resting pose and spawn the stages
    pub async fn start(&mut self, preset: Preset) -> Result<(), PipelineError> {
        if self.running.is_some() {
            warn!("Pipeline already running, handshake ignored");
            return Ok(());
        }

        info!(
            "Starting pipeline: first fruit {}, {} points, conveyor {}%",
            preset.initial_id, preset.measure_point_count, preset.conveyor_speed
        );
        self.pool.populate(preset.initial_id);

        let (sender, receiver) = telemetry::channel(self.settings.telemetry_capacity);
        let ctx = PipelineContext::new(
            self.pool.clone(),
            preset,
            sender,
            self.hardware.clone(),
            self.settings.clone(),
        );

        self.drive_safe_defaults();
        self.send_status(status::INITIALIZED).await?;

        let mut tasks = JoinSet::new();
        let writer = self.writer.clone();
        tasks.spawn(async move {
            if let Err(e) = receiver.run_writer(writer).await {
                error!("Telemetry writer failed: {}", e);
            }
        });
        tasks.spawn(home_and_start_conveyor(ctx.clone()));
        tasks.spawn(InputStage::new(ctx.clone()).run());
        tasks.spawn(MeasureStage::new(ctx.clone()).run());
        tasks.spawn(SortingStage::new(ctx.clone()).run());
        if let Some(interval) = self.settings.audit_interval() {
            tasks.spawn(audit::run_audit(self.pool.clone(), interval));
        }

        self.running = Some(RunningPipeline { ctx, tasks });
        self.phase = LifecyclePhase::Running;
        Ok(())
    }

    /// Abort the run, reset the pool and wait for a new handshake
    pub async fn stop(&mut self) -> Result<(), PipelineError> {
        if !self.halt(Some(status::STOPPING)).await? {
            debug!("Stop requested while not running");
            return Ok(());
        }

        self.await_handshake().await
    }

    /// Abort any run and go idle (host link closed)
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.halt(None).await {
            warn!("Shutdown: {}", e);
        }
        self.phase = LifecyclePhase::Idle;
        info!("Controller idle");
    }

    /// Abort the run tasks and drop queued telemetry, writing `farewell`
    /// first. Returns `false` if nothing was running.
    async fn halt(&mut self, farewell: Option<&str>) -> Result<bool, PipelineError> {
        let Some(mut run) = self.running.take() else {
            return Ok(false);
        };

        self.phase = LifecyclePhase::Stopping;
        info!("Stopping pipeline");

        // While the lock is held the telemetry writer sits between lines.
        let writer = self.writer.clone();
        let mut writer = writer.lock().await;
        let sent = match farewell {
            Some(text) => writer.send_line(text).await,
            None => Ok(()),
        };

        run.tasks.abort_all();
        while let Some(joined) = run.tasks.join_next().await {
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    error!("Pipeline task failed: {}", e);
                }
            }
        }
        drop(writer);

        self.hardware.set_conveyor(0);
        drop(run);
        self.pool.reset();
        sent?;
        Ok(true)
    }

    /// Non-blocking part of the resting pose
    fn drive_safe_defaults(&self) {
        let hw = &self.hardware;
        hw.gripper_release(true);
        hw.probe_detach(true);
        hw.gate_open();
        hw.set_bin_angle(self.settings.geometry.bin_center_deg);
    }
}

/// Home the gripper, then start the conveyor at the preset speed.
///
/// Runs as a run task so a stuck home switch can still be aborted by stop.
async fn home_and_start_conveyor(ctx: PipelineContext) {
    ctx.actuate("gripper home", ctx.hardware.gripper_home()).await;
    ctx.hardware.set_conveyor(ctx.preset.conveyor_speed);
    info!("Gripper homed, conveyor at {}%", ctx.preset.conveyor_speed);
}
