//! Fruit Sorting Line Controller - Main Entry Point

use controller::{init_logging, run};
use pipeline::PipelineSettings;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional settings file path; environment variables override it.
    let config_path = std::env::args().nth(1);
    let settings = PipelineSettings::load(config_path.as_deref())?;
    init_logging(&settings.log_level, settings.log_json);

    info!("=== Fruit Sorting Controller v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Host link {} at {} baud, {} fruit slots",
        settings.serial.device, settings.serial.baud_rate, settings.pool_size
    );

    run(settings).await?;

    Ok(())
}
