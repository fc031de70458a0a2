//! Host link handler
//!
//! Single long-lived task that reads every inbound line. It drives the
//! handshake, forwards point acknowledgments and classifications to the
//! pool, and asks the controller to stop. It survives every stop.

use crate::error::PipelineError;
use crate::lifecycle::{Controller, LifecyclePhase};
use fruit_pool::FruitPool;
use metrics::counter;
use sorter_protocol::{status, FruitState, HostCommand, LineReader, ProtocolError, StateUpdate};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// What a runtime update did to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Point acknowledgment recorded
    Acknowledged,
    /// Sorting type recorded
    Classified(u8),
    /// No slot holds the fruit id
    UnknownFruit,
    /// Sorting type out of range
    InvalidValue,
    /// State carries no action
    Ignored,
}

/// Apply one `<id>|<STATE_NAME>|<value>` update to the pool
pub fn apply_update(pool: &FruitPool, update: &StateUpdate) -> UpdateOutcome {
    let Some(fruit) = pool.find_record(update.fruit_id) else {
        debug!("Update for unknown fruit {}, ignored", update.fruit_id);
        counter!("sorter_host_messages_ignored_total").increment(1);
        return UpdateOutcome::UnknownFruit;
    };

    match update.state {
        Some(FruitState::MeasureProcessing) => {
            if update.value != fruit.point_measured() as i64 {
                debug!(
                    "Fruit {}: ack for point {} while measuring point {}",
                    update.fruit_id,
                    update.value,
                    fruit.point_measured()
                );
            }
            fruit.acknowledge_point();
            UpdateOutcome::Acknowledged
        }
        Some(FruitState::MeasurePassed) => match u8::try_from(update.value) {
            Ok(sorting_type @ (1 | 2)) => {
                fruit.set_sorting_type(sorting_type);
                debug!("Fruit {} classified as type {}", update.fruit_id, sorting_type);
                UpdateOutcome::Classified(sorting_type)
            }
            _ => {
                warn!(
                    "Invalid sorting type {} for fruit {}, ignored",
                    update.value, update.fruit_id
                );
                counter!("sorter_host_messages_ignored_total").increment(1);
                UpdateOutcome::InvalidValue
            }
        },
        _ => {
            debug!("Update {:?} for fruit {} ignored", update.state, update.fruit_id);
            UpdateOutcome::Ignored
        }
    }
}

/// Reads host lines and dispatches them to the controller
pub struct HostLink<R, W> {
    reader: LineReader<R>,
    controller: Controller<W>,
}

impl<R, W> HostLink<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: LineReader<R>, controller: Controller<W>) -> Self {
        Self { reader, controller }
    }

    /// Prompt for the handshake and serve the link until the host closes it
    pub async fn run(mut self) -> Result<(), PipelineError> {
        self.controller.await_handshake().await?;

        let result = self.serve().await;
        self.controller.shutdown().await;
        result
    }

    async fn serve(&mut self) -> Result<(), PipelineError> {
        loop {
            let line = match self.reader.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Host link closed");
                    return Ok(());
                }
                Err(e @ ProtocolError::LineTooLong { .. }) => {
                    warn!("Discarding inbound line: {}", e);
                    if !self.is_running() {
                        self.controller.send_status(status::INIT_FAILED).await?;
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if line.is_empty() {
                continue;
            }
            self.dispatch(&line).await?;
        }
    }

    fn is_running(&self) -> bool {
        self.controller.phase() == LifecyclePhase::Running
    }

    async fn dispatch(&mut self, line: &str) -> Result<(), PipelineError> {
        let running = self.is_running();

        match (HostCommand::parse(line), running) {
            (Ok(HostCommand::Wake), _) => self.controller.send_status(status::AWAKE).await?,
            (Ok(HostCommand::Stop), true) => self.controller.stop().await?,
            (Ok(HostCommand::Stop), false) => debug!("Stop received while not running"),
            (Ok(HostCommand::Update(update)), true) => {
                apply_update(self.controller.pool(), &update);
            }
            (Ok(HostCommand::Confirm(_)), true) => {
                warn!("Handshake received while running, ignored");
            }
            (Ok(HostCommand::Confirm(preset)), false) => self.controller.start(preset).await?,
            (Err(e), true) => {
                warn!("Discarding malformed line {:?}: {}", line, e);
                counter!("sorter_host_messages_ignored_total").increment(1);
            }
            (Ok(HostCommand::Update(_)) | Err(_), false) => {
                self.controller.report_handshake_failure(line).await?;
            }
        }
        Ok(())
    }
}
