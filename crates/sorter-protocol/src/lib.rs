//! Sorting Line Host Protocol
//!
//! This crate provides the newline-terminated, pipe-delimited text protocol
//! spoken between the line controller and the classification host, plus
//! async line transport over a serial port or any tokio byte stream.

mod error;
mod link;
mod message;
mod state;

pub use error::ProtocolError;
pub use link::{open_serial, split_stream, LineReader, LineWriter, SerialReader, SerialWriter};
pub use message::{HostCommand, Preset, StateUpdate, TelemetryMessage, NO_PAYLOAD};
pub use state::FruitState;

/// Fixed status lines written by the controller
pub mod status {
    /// Written whenever the controller (re)enters the handshake wait
    pub const INITIALIZE: &str = "initialize system";
    /// Written after a valid `confirm|...` line
    pub const INITIALIZED: &str = "System initialized successfully.";
    /// Written after a malformed handshake line
    pub const INIT_FAILED: &str = "Initialization failed: invalid confirmation message.";
    /// Written when the host requests a stop
    pub const STOPPING: &str = "Stop command received, stopping system...";
    /// Reply to the host's presence probe
    pub const AWAKE: &str = "awake";
}

/// Protocol constants
pub mod wire {
    /// Field separator
    pub const SEPARATOR: char = '|';
    /// Keyword opening the handshake line
    pub const CONFIRM_KEYWORD: &str = "confirm";
    /// Stop command (case-insensitive)
    pub const STOP_COMMAND: &str = "stop";
    /// Presence probe sent by the host (case-insensitive)
    pub const WAKE_COMMAND: &str = "wake?";
    /// Default serial baud rate
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;
    /// Default inbound line limit in bytes, excluding the terminator
    pub const DEFAULT_MAX_LINE_LEN: usize = 64;
}
