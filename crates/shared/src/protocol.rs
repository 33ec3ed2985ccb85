//! Gateway wire protocol: opcodes, the frame envelope, handshake payloads and
//! the two-level event type inbound frames decode into.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::models::{Interaction, Message, Ready};

pub const GATEWAY_URL: &str = "wss://gateway.discord.gg";
pub const API_URL: &str = "https://discord.com/api/v10";
pub const GATEWAY_VERSION: u8 = 9;
pub const CLIENT_NAME: &str = "distodo";

/// GUILD_MESSAGES | GUILD_MESSAGE_REACTIONS | GUILD_MESSAGE_TYPING
pub const INTENTS: u64 = (1 << 9) | (1 << 10) | (1 << 11);

/// Gateway opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Dispatch,
    Heartbeat,
    Identify,
    PresenceUpdate,
    VoiceStateUpdate,
    Resume,
    Reconnect,
    RequestGuildMembers,
    InvalidSession,
    Hello,
    HeartbeatAck,
    Unknown(i64),
}

impl From<i64> for Opcode {
    fn from(value: i64) -> Self {
        match value {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            4 => Self::VoiceStateUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => Self::Unknown(other),
        }
    }
}

impl From<Opcode> for i64 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Dispatch => 0,
            Opcode::Heartbeat => 1,
            Opcode::Identify => 2,
            Opcode::PresenceUpdate => 3,
            Opcode::VoiceStateUpdate => 4,
            Opcode::Resume => 6,
            Opcode::Reconnect => 7,
            Opcode::RequestGuildMembers => 8,
            Opcode::InvalidSession => 9,
            Opcode::Hello => 10,
            Opcode::HeartbeatAck => 11,
            Opcode::Unknown(other) => other,
        }
    }
}

/// Dispatch event names consumed by the client.
pub mod dispatch {
    pub const READY: &str = "READY";
    pub const RESUMED: &str = "RESUMED";
    pub const TYPING_START: &str = "TYPING_START";
    pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";
    pub const INTERACTION_CREATE: &str = "INTERACTION_CREATE";
}

/// The JSON envelope every gateway frame travels in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayFrame {
    /// Any integer; values outside the known set decode to [`Opcode::Unknown`].
    pub op: i64,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayFrame {
    fn control(op: Opcode, d: Value) -> Self {
        Self {
            op: op.into(),
            d,
            s: None,
            t: None,
        }
    }

    pub fn opcode(&self) -> Opcode {
        Opcode::from(self.op)
    }

    /// Heartbeat carrying the last sequence seen, or null before any dispatch.
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self::control(Opcode::Heartbeat, sequence.map_or(Value::Null, Value::from))
    }

    pub fn identify(payload: &IdentifyPayload) -> Self {
        Self::control(Opcode::Identify, to_value(payload))
    }

    pub fn resume(payload: &ResumePayload) -> Self {
        Self::control(Opcode::Resume, to_value(payload))
    }
}

fn to_value<T: Serialize>(payload: &T) -> Value {
    // Handshake payloads are plain string/integer structs
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl ConnectionProperties {
    pub fn new(os: impl Into<String>, client_name: &str) -> Self {
        Self {
            os: os.into(),
            browser: client_name.to_string(),
            device: client_name.to_string(),
        }
    }
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self::new(std::env::consts::OS, CLIENT_NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub intents: u64,
    pub properties: ConnectionProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    pub seq: u64,
}

#[derive(Debug, Deserialize)]
struct HelloPayload {
    heartbeat_interval: u64,
}

/// A decoded inbound frame. The outer level is the opcode; dispatches carry
/// a second level keyed by event name.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Dispatch {
        seq: Option<u64>,
        event: DispatchEvent,
    },
    Heartbeat,
    Reconnect,
    InvalidSession {
        resumable: bool,
    },
    Hello {
        heartbeat_interval: Duration,
    },
    HeartbeatAck,
    /// Opcodes the server is not expected to send.
    Unknown {
        op: i64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    Ready(Ready),
    Resumed,
    TypingStart,
    MessageCreate(Box<Message>),
    InteractionCreate(Box<Interaction>),
    /// Any dispatch the client does not consume.
    Other(String),
}

impl DispatchEvent {
    pub fn name(&self) -> &str {
        match self {
            DispatchEvent::Ready(_) => dispatch::READY,
            DispatchEvent::Resumed => dispatch::RESUMED,
            DispatchEvent::TypingStart => dispatch::TYPING_START,
            DispatchEvent::MessageCreate(_) => dispatch::MESSAGE_CREATE,
            DispatchEvent::InteractionCreate(_) => dispatch::INTERACTION_CREATE,
            DispatchEvent::Other(name) => name,
        }
    }

    fn from_parts(name: String, d: Value) -> Result<Self, ProtocolError> {
        let event = match name.as_str() {
            dispatch::READY => DispatchEvent::Ready(parse_payload(&name, d)?),
            dispatch::RESUMED => DispatchEvent::Resumed,
            dispatch::TYPING_START => DispatchEvent::TypingStart,
            dispatch::MESSAGE_CREATE => DispatchEvent::MessageCreate(parse_payload(&name, d)?),
            dispatch::INTERACTION_CREATE => {
                DispatchEvent::InteractionCreate(parse_payload(&name, d)?)
            }
            _ => DispatchEvent::Other(name),
        };
        Ok(event)
    }
}

fn parse_payload<T: DeserializeOwned>(event: &str, d: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(d).map_err(|source| ProtocolError::Payload {
        event: event.to_string(),
        source,
    })
}

impl GatewayEvent {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let frame: GatewayFrame = serde_json::from_str(text)?;
        Self::from_frame(frame)
    }

    pub fn from_frame(frame: GatewayFrame) -> Result<Self, ProtocolError> {
        let event = match frame.opcode() {
            Opcode::Dispatch => {
                let name = frame.t.ok_or(ProtocolError::MissingEventName)?;
                GatewayEvent::Dispatch {
                    seq: frame.s,
                    event: DispatchEvent::from_parts(name, frame.d)?,
                }
            }
            Opcode::Heartbeat => GatewayEvent::Heartbeat,
            Opcode::Reconnect => GatewayEvent::Reconnect,
            Opcode::InvalidSession => GatewayEvent::InvalidSession {
                resumable: frame.d.as_bool().unwrap_or(false),
            },
            Opcode::Hello => {
                let hello: HelloPayload = serde_json::from_value(frame.d)?;
                if hello.heartbeat_interval == 0 {
                    return Err(ProtocolError::InvalidHeartbeatInterval);
                }
                GatewayEvent::Hello {
                    heartbeat_interval: Duration::from_millis(hello.heartbeat_interval),
                }
            }
            Opcode::HeartbeatAck => GatewayEvent::HeartbeatAck,
            other => GatewayEvent::Unknown { op: other.into() },
        };
        Ok(event)
    }
}
