//! Message Definitions and Line Parsing
//!
//! Inbound lines from the host are decoded into [`HostCommand`]s; outbound
//! state changes are encoded from [`TelemetryMessage`]s.

use crate::error::ProtocolError;
use crate::state::FruitState;
use crate::wire::{CONFIRM_KEYWORD, SEPARATOR, STOP_COMMAND, WAKE_COMMAND};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Payload sent when a telemetry message carries no value
pub const NO_PAYLOAD: i32 = -1;

/// Run parameters received in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    /// Id given to the first fruit of the run
    pub initial_id: i64,
    /// Number of spectral points taken per fruit
    pub measure_point_count: u32,
    /// Conveyor speed in percent
    pub conveyor_speed: u8,
}

impl Preset {
    /// Parse `confirm|<initial_id>|<measure_point_count>|<conveyor_speed>`
    pub fn parse_confirm(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        let fields: Vec<&str> = line.split(SEPARATOR).map(str::trim).collect();

        if fields.len() != 4 || !fields[0].eq_ignore_ascii_case(CONFIRM_KEYWORD) {
            return Err(ProtocolError::Malformed(line.to_string()));
        }

        Ok(Self {
            initial_id: parse_field(fields[1], "initial fruit id", line)?,
            measure_point_count: parse_field(fields[2], "measure point count", line)?,
            conveyor_speed: parse_field(fields[3], "conveyor speed", line)?,
        })
    }
}

/// Runtime update for a single fruit, `<id>|<STATE_NAME>|<value>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    /// Fruit the update refers to
    pub fruit_id: i64,
    /// Parsed state, `None` when the name is not a known state
    pub state: Option<FruitState>,
    /// Integer value (point number or sorting type)
    pub value: i64,
}

/// A decoded inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// Soft restart request
    Stop,
    /// Presence probe
    Wake,
    /// Handshake with run parameters
    Confirm(Preset),
    /// Acknowledgment or classification for a fruit
    Update(StateUpdate),
}

impl HostCommand {
    /// Decode one line (terminator already stripped)
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();

        if line.eq_ignore_ascii_case(STOP_COMMAND) {
            return Ok(HostCommand::Stop);
        }
        if line.eq_ignore_ascii_case(WAKE_COMMAND) {
            return Ok(HostCommand::Wake);
        }

        let head = line.split(SEPARATOR).next().unwrap_or_default().trim();
        if head.eq_ignore_ascii_case(CONFIRM_KEYWORD) {
            return Preset::parse_confirm(line).map(HostCommand::Confirm);
        }

        let fields: Vec<&str> = line.split(SEPARATOR).map(str::trim).collect();
        if fields.len() != 3 {
            return Err(ProtocolError::Malformed(line.to_string()));
        }

        Ok(HostCommand::Update(StateUpdate {
            fruit_id: parse_field(fields[0], "fruit id", line)?,
            state: FruitState::from_wire(fields[1]),
            value: parse_field(fields[2], "value", line)?,
        }))
    }
}

/// State change report sent to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    /// Fruit the report refers to
    pub fruit_id: i64,
    /// State the fruit just entered
    pub state: FruitState,
    /// Diameter ms, point number, sorting type, or [`NO_PAYLOAD`]
    pub payload: i32,
}

impl TelemetryMessage {
    /// Create a new message
    pub fn new(fruit_id: i64, state: FruitState, payload: i32) -> Self {
        Self {
            fruit_id,
            state,
            payload,
        }
    }

    /// Create a message with no meaningful payload
    pub fn bare(fruit_id: i64, state: FruitState) -> Self {
        Self::new(fruit_id, state, NO_PAYLOAD)
    }

    /// Encode as a wire line without terminator
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TelemetryMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.fruit_id,
            self.state,
            self.payload,
            sep = SEPARATOR
        )
    }
}

impl FromStr for TelemetryMessage {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let fields: Vec<&str> = line.split(SEPARATOR).map(str::trim).collect();
        if fields.len() != 3 {
            return Err(ProtocolError::Malformed(line.to_string()));
        }

        Ok(Self {
            fruit_id: parse_field(fields[0], "fruit id", line)?,
            state: fields[1].parse()?,
            payload: parse_field(fields[2], "payload", line)?,
        })
    }
}

fn parse_field<T: FromStr>(field: &str, name: &'static str, line: &str) -> Result<T, ProtocolError> {
    field.parse().map_err(|_| ProtocolError::InvalidField {
        field: name,
        line: line.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_confirm_parse() {
        let preset = Preset::parse_confirm("confirm|3|12|60").unwrap();
        assert_eq!(
            preset,
            Preset {
                initial_id: 3,
                measure_point_count: 12,
                conveyor_speed: 60,
            }
        );
    }

    #[test]
    fn test_confirm_rejects_missing_speed() {
        assert!(matches!(
            Preset::parse_confirm("confirm|3|12"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_confirm_rejects_bad_number() {
        let err = Preset::parse_confirm("confirm|abc|12|60").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { field: "initial fruit id", .. }));
    }

    #[test]
    fn test_stop_and_wake_are_case_insensitive() {
        assert_eq!(HostCommand::parse("STOP").unwrap(), HostCommand::Stop);
        assert_eq!(HostCommand::parse(" Stop ").unwrap(), HostCommand::Stop);
        assert_eq!(HostCommand::parse("Wake?").unwrap(), HostCommand::Wake);
    }

    #[test]
    fn test_update_parse() {
        let cmd = HostCommand::parse("7|MEASURE_PASSED|2").unwrap();
        assert_eq!(
            cmd,
            HostCommand::Update(StateUpdate {
                fruit_id: 7,
                state: Some(FruitState::MeasurePassed),
                value: 2,
            })
        );
    }

    #[test]
    fn test_update_with_unknown_state_is_accepted() {
        let cmd = HostCommand::parse("7|CALIBRATING|0").unwrap();
        assert!(matches!(cmd, HostCommand::Update(StateUpdate { state: None, .. })));
    }

    #[test]
    fn test_update_wrong_arity() {
        assert!(HostCommand::parse("7|MEASURE_PASSED").is_err());
        assert!(HostCommand::parse("7|MEASURE_PASSED|2|9").is_err());
        assert!(HostCommand::parse("").is_err());
    }

    #[test]
    fn test_telemetry_encoding() {
        let msg = TelemetryMessage::new(12, FruitState::InputPassed, 85);
        assert_eq!(msg.encode(), "12|INPUT_PASSED|85");
        assert_eq!(TelemetryMessage::bare(12, FruitState::MeasurePassed).encode(), "12|MEASURE_PASSED|-1");
    }

    proptest! {
        #[test]
        fn prop_telemetry_line_decodes(id in any::<i64>(), raw in 0u8..7, payload in any::<i32>()) {
            let state = FruitState::from_u8(raw).unwrap();
            let msg = TelemetryMessage::new(id, state, payload);
            let decoded: TelemetryMessage = msg.encode().parse().unwrap();
            prop_assert_eq!(decoded, msg);
        }

        #[test]
        fn prop_parse_never_panics(line in "\\PC{0,80}") {
            let _ = HostCommand::parse(&line);
        }
    }
}
