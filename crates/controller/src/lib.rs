//! Fruit Sorting Line Controller
//!
//! Opens the serial host link, attaches the line drivers and serves the host
//! until it disconnects.

use line_hardware::{LineHardware, SimulatedLine};
use pipeline::{Controller, HostLink, PipelineError, PipelineSettings};
use sorter_protocol::open_serial;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Parse a log level name, falling back to INFO
pub fn log_level(name: &str) -> Level {
    name.parse().unwrap_or_else(|_| {
        eprintln!("Unknown log level {:?}, using info", name);
        Level::INFO
    })
}

/// Initialize logging
pub fn init_logging(level: &str, json: bool) {
    let builder = FmtSubscriber::builder()
        .with_max_level(log_level(level))
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.expect("Failed to set tracing subscriber");
}

/// Serve the host over the configured serial device until it closes the link
pub async fn run(settings: PipelineSettings) -> Result<(), PipelineError> {
    let serial = &settings.serial;
    let (reader, writer) = open_serial(&serial.device, serial.baud_rate, serial.max_line_len)?;

    warn!("No line drivers configured, using the simulated line");
    let hardware: Arc<dyn LineHardware> = Arc::new(SimulatedLine::new(settings.geometry.clone()));

    let controller = Controller::new(writer, hardware, Arc::new(settings));
    HostLink::new(reader, controller).run().await?;

    info!("Controller stopped");
    Ok(())
}
