use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Item key reserved for directives addressed to the bridge itself rather
/// than to a device.
pub const CONTROL_KEY: &str = "ROS_COMMAND";

/// A single `(key, value)` observation of an openHAB item.
///
/// Both fields are opaque to the bridge: values are only ever compared for
/// equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub key: String,
    pub value: String,
}

impl ItemUpdate {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Which inbound bus channel a [`CommandEvent`] arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Device command (`POST /rest/items/{key}`), or a control-plane
    /// directive when the key is [`CONTROL_KEY`].
    Command,
    /// Status update (`PUT /rest/items/{key}/state`).
    Set,
}

/// Inbound request from the robot side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEvent {
    pub kind: CommandKind,
    pub key: String,
    pub value: String,
}

impl CommandEvent {
    pub fn command(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Command,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Set,
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Control-plane instructions understood by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Drop every cached value so the next poll republishes the whole group.
    Refresh,
}

impl Directive {
    /// Parse the value of a [`CONTROL_KEY`] command.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnrecognizedDirective`] for anything other than
    /// the known directive names.
    pub fn parse(value: &str) -> Result<Self, BridgeError> {
        match value {
            "REFRESH" => Ok(Directive::Refresh),
            other => Err(BridgeError::UnrecognizedDirective(other.to_string())),
        }
    }
}

/// Point-in-time copy of the bridge counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub updates: u64,
    pub commands: u64,
    pub errors: u64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} updates={} commands={} errors={}",
            self.timestamp.to_rfc3339(),
            self.updates,
            self.commands,
            self.errors
        )
    }
}

/// Unified event wrapper for the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. "ohros-runtime::poll"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// An openHAB item changed and should be published to ROS.
    ItemChanged(ItemUpdate),
    /// A command or set request received from ROS.
    Inbound(CommandEvent),
    /// Periodic counters.
    Stats(StatsSnapshot),
    /// Something the operator should know about; never fatal.
    BridgeFault { component: String, message: String },
}

/// Coarse error category, used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Protocol,
    MalformedResponse,
    UnrecognizedDirective,
    Channel,
    Unexpected,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Protocol => "protocol",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::UnrecognizedDirective => "unrecognized_directive",
            ErrorKind::Channel => "channel",
            ErrorKind::Unexpected => "unexpected",
        };
        f.write_str(s)
    }
}

/// Every failure the bridge can observe. None of them is fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Connection refused, timeout, DNS failure.
    #[error("Transport Error: {0}")]
    Transport(String),

    /// The source system answered with a non-success status.
    #[error("Protocol Error: HTTP {status}")]
    Protocol { status: u16 },

    /// The response body did not have the expected shape.
    #[error("Malformed Response: {0}")]
    MalformedResponse(String),

    #[error("Unrecognized Directive: {0:?}")]
    UnrecognizedDirective(String),

    #[error("Channel Error: {0}")]
    Channel(String),


    /// Anything not covered above.
    #[error("Unexpected Error: {0}")]
    Unexpected(String),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Transport(_) => ErrorKind::Transport,
            BridgeError::Protocol { .. } => ErrorKind::Protocol,
            BridgeError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            BridgeError::UnrecognizedDirective(_) => ErrorKind::UnrecognizedDirective,
            BridgeError::Channel(_) => ErrorKind::Channel,
            BridgeError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_parse_refresh() {
        assert_eq!(Directive::parse("REFRESH"), Ok(Directive::Refresh));
    }

    #[test]
    fn directive_parse_unknown_is_error() {
        let err = Directive::parse("REBOOT").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnrecognizedDirective);
        assert!(err.to_string().contains("REBOOT"));
        // Case matters.
        assert!(Directive::parse("refresh").is_err());
    }

    #[test]
    fn command_kind_serializes_lowercase() {
        let json = serde_json::to_string(&CommandEvent::set("Door", "OPEN")).unwrap();
        assert!(json.contains("\"set\""));
        let back: CommandEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, CommandKind::Set);
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "ohros-runtime::poll",
            EventPayload::ItemChanged(ItemUpdate::new("temp", "70")),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        match back.payload {
            EventPayload::ItemChanged(u) => assert_eq!(u, ItemUpdate::new("temp", "70")),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn stats_snapshot_display_lists_counters() {
        let snap = StatsSnapshot {
            timestamp: Utc::now(),
            updates: 3,
            commands: 2,
            errors: 1,
        };
        let text = snap.to_string();
        assert!(text.contains("updates=3"));
        assert!(text.contains("commands=2"));
        assert!(text.contains("errors=1"));
    }

    #[test]
    fn bridge_error_display_and_kind() {
        let err = BridgeError::Protocol { status: 503 };
        assert!(err.to_string().contains("503"));
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(ErrorKind::MalformedResponse.to_string(), "malformed_response");
    }
}
