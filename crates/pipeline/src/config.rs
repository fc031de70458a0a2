//! Controller settings

use crate::error::PipelineError;
use config::Config;
use line_hardware::LineGeometry;
use serde::{Deserialize, Serialize};
use sorter_protocol::wire::{DEFAULT_BAUD_RATE, DEFAULT_MAX_LINE_LEN};
use std::time::Duration;
use tracing::info;

/// Environment variable prefix, e.g. `SORTER__SERIAL__DEVICE`
pub const ENV_PREFIX: &str = "SORTER";

/// Default settings file (extension resolved by the `config` crate)
pub const DEFAULT_CONFIG_PATH: &str = "config/sorter";

/// Serial host link settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Device path (e.g. "/dev/ttyUSB0")
    pub device: String,
    /// Baud rate (default: 115200)
    pub baud_rate: u32,
    /// Longest accepted inbound line in bytes
    pub max_line_len: usize,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// Loop periods of the stage tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTiming {
    /// Input stage sampling period (ms)
    pub input_tick_ms: u64,
    /// Measure stage loop period (ms)
    pub measure_tick_ms: u64,
    /// Sorting stage sampling period (ms)
    pub sorting_tick_ms: u64,
    /// Poll period while waiting for a host acknowledgment (ms)
    pub ack_poll_ms: u64,
    /// Sorting stage period while its fruit is unclassified (ms)
    pub idle_wait_ms: u64,
}

impl Default for StageTiming {
    fn default() -> Self {
        Self {
            input_tick_ms: 1,
            measure_tick_ms: 5,
            sorting_tick_ms: 1,
            ack_poll_ms: 10,
            idle_wait_ms: 10,
        }
    }
}

impl StageTiming {
    pub fn input_tick(&self) -> Duration {
        Duration::from_millis(self.input_tick_ms)
    }

    pub fn measure_tick(&self) -> Duration {
        Duration::from_millis(self.measure_tick_ms)
    }

    pub fn sorting_tick(&self) -> Duration {
        Duration::from_millis(self.sorting_tick_ms)
    }

    pub fn ack_poll(&self) -> Duration {
        Duration::from_millis(self.ack_poll_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

/// Complete controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Host link
    pub serial: SerialSettings,
    /// Log level name (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of plain text
    pub log_json: bool,
    /// Number of fruit slots
    pub pool_size: usize,
    /// Telemetry queue capacity; messages beyond it are dropped
    pub telemetry_capacity: usize,
    /// Stage loop periods
    pub timing: StageTiming,
    /// Mechanical constants
    pub geometry: LineGeometry,
    /// Give up on a host point acknowledgment after this long (unset = wait forever)
    pub host_ack_timeout_ms: Option<u64>,
    /// Give up on a blocking actuation after this long (unset = wait forever)
    pub actuator_timeout_ms: Option<u64>,
    /// Period of the read-only transition audit (unset = disabled)
    pub audit_interval_ms: Option<u64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            serial: SerialSettings::default(),
            log_level: "info".to_string(),
            log_json: false,
            pool_size: fruit_pool::DEFAULT_POOL_SIZE,
            telemetry_capacity: 10,
            timing: StageTiming::default(),
            geometry: LineGeometry::default(),
            host_ack_timeout_ms: None,
            actuator_timeout_ms: None,
            audit_interval_ms: None,
        }
    }
}

impl PipelineSettings {
    /// Load settings from an optional file and `SORTER__*` environment variables.
    ///
    /// Missing keys fall back to defaults; a missing file is not an error.
    pub fn load(path: Option<&str>) -> Result<Self, PipelineError> {
        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);
        let settings: Self = Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        info!("Loaded settings (config path: {})", path);
        Ok(settings)
    }

    /// Check values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.pool_size == 0 {
            return Err(PipelineError::InvalidSettings("pool_size must be at least 1".into()));
        }
        if self.telemetry_capacity == 0 {
            return Err(PipelineError::InvalidSettings(
                "telemetry_capacity must be at least 1".into(),
            ));
        }
        if self.serial.max_line_len == 0 {
            return Err(PipelineError::InvalidSettings(
                "serial.max_line_len must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn host_ack_timeout(&self) -> Option<Duration> {
        self.host_ack_timeout_ms.map(Duration::from_millis)
    }

    pub fn actuator_timeout(&self) -> Option<Duration> {
        self.actuator_timeout_ms.map(Duration::from_millis)
    }

    pub fn audit_interval(&self) -> Option<Duration> {
        self.audit_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_line() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.pool_size, 5);
        assert_eq!(settings.telemetry_capacity, 10);
        assert_eq!(settings.serial.baud_rate, 115_200);
        assert_eq!(settings.timing.measure_tick(), Duration::from_millis(5));
        assert!(settings.host_ack_timeout().is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let settings = PipelineSettings::load(Some("does/not/exist/sorter")).unwrap();
        assert_eq!(settings.pool_size, 5);
        assert_eq!(settings.geometry, LineGeometry::default());
    }

    #[test]
    fn test_validation_rejects_empty_pool() {
        let settings = PipelineSettings {
            pool_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(PipelineError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_zero_audit_interval_disables_audit() {
        let settings = PipelineSettings {
            audit_interval_ms: Some(0),
            ..Default::default()
        };
        assert!(settings.audit_interval().is_none());
    }
}
