//! Sorting Line Pipeline
//!
//! Runs the three stage coordinators (input, measure, sorting) over a shared
//! fruit pool, streams their transitions to the host and handles the host
//! link: handshake, point acknowledgments, classifications and stop.

mod audit;
mod config;
mod context;
mod edge;
mod error;
pub mod gripper;
mod host_link;
mod lifecycle;
pub mod stages;
pub mod telemetry;

pub use audit::run_audit;
pub use config::{PipelineSettings, SerialSettings, StageTiming, DEFAULT_CONFIG_PATH, ENV_PREFIX};
pub use context::PipelineContext;
pub use edge::{Edge, EdgeDetector};
pub use error::PipelineError;
pub use host_link::{apply_update, HostLink, UpdateOutcome};
pub use lifecycle::{Controller, LifecyclePhase};
