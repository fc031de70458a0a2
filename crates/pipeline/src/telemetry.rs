//! Telemetry channel
//!
//! Bounded queue between the stage tasks (producers) and the serial writer
//! (single consumer). Producers never block: a full queue drops the message.

use crate::error::PipelineError;
use metrics::counter;
use sorter_protocol::{LineWriter, TelemetryMessage};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

/// Line writer shared by the telemetry writer and the lifecycle controller
pub type SharedWriter<W> = Arc<Mutex<LineWriter<W>>>;

/// Create a telemetry channel with room for `capacity` messages
pub fn channel(capacity: usize) -> (TelemetrySender, TelemetryReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (TelemetrySender { tx }, TelemetryReceiver { rx })
}

/// Producer handle, cloned into every stage
#[derive(Debug, Clone)]
pub struct TelemetrySender {
    tx: mpsc::Sender<TelemetryMessage>,
}

impl TelemetrySender {
    /// Queue a message without waiting. Returns `false` if it was dropped.
    pub fn send(&self, msg: TelemetryMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                debug!("Telemetry queue full, dropping {}", msg);
                counter!("sorter_telemetry_dropped_total").increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(msg)) => {
                debug!("Telemetry queue closed, dropping {}", msg);
                false
            }
        }
    }
}

/// Consumer side of the channel
#[derive(Debug)]
pub struct TelemetryReceiver {
    rx: mpsc::Receiver<TelemetryMessage>,
}

impl TelemetryReceiver {
    /// Wait for at least one message, then take everything pending.
    ///
    /// Returns an empty batch once every sender is gone.
    pub async fn next_batch(&mut self) -> Vec<TelemetryMessage> {
        match self.rx.recv().await {
            Some(first) => {
                let mut batch = vec![first];
                batch.extend(self.drain_pending());
                batch
            }
            None => Vec::new(),
        }
    }

    /// Take every message already queued without waiting
    pub fn drain_pending(&mut self) -> Vec<TelemetryMessage> {
        let mut pending = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            pending.push(msg);
        }
        pending
    }

    /// Write every batch to the host until the channel closes
    pub async fn run_writer<W>(mut self, writer: SharedWriter<W>) -> Result<(), PipelineError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        info!("Telemetry writer started");
        loop {
            let batch = self.next_batch().await;
            if batch.is_empty() {
                break;
            }

            let mut writer = writer.lock().await;
            for msg in &batch {
                writer.send_telemetry(msg).await?;
            }
        }
        info!("Telemetry writer stopped");
        Ok(())
    }
}
