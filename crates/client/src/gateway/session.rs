//! Connection-scoped session state: credentials, resume data and the
//! handshake phase.

use std::fmt;
use std::time::Duration;

use distodo_shared::{ConnectionProperties, IdentifyPayload, Ready, ResumePayload, INTENTS};

/// Bot token. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where the connection is in the HELLO / IDENTIFY / RESUME handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    AwaitingHello,
    Identifying,
    Resuming,
    Ready,
}

impl ConnectionPhase {
    /// An IDENTIFY or RESUME has been sent and not yet answered.
    pub fn is_handshaking(&self) -> bool {
        matches!(self, ConnectionPhase::Identifying | ConnectionPhase::Resuming)
    }
}

/// What survives a finished run: enough to RESUME on the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub token: Token,
    pub session_id: Option<String>,
    pub sequence: Option<u64>,
}

impl SessionSnapshot {
    /// Snapshot for a first connection with nothing to resume.
    pub fn new(token: impl Into<Token>) -> Self {
        Self {
            token: token.into(),
            session_id: None,
            sequence: None,
        }
    }
}

#[derive(Debug)]
pub struct Session {
    token: Token,
    session_id: Option<String>,
    sequence: Option<u64>,
    application_id: Option<String>,
    heartbeat_interval: Option<Duration>,
    reconnecting: bool,
    phase: ConnectionPhase,
    /// No heartbeat is waiting for an ack.
    heartbeat_acked: bool,
}

impl Session {
    pub fn new(token: impl Into<Token>) -> Self {
        Self::from_snapshot(SessionSnapshot::new(token))
    }

    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            token: snapshot.token,
            session_id: snapshot.session_id,
            sequence: snapshot.sequence,
            application_id: None,
            heartbeat_interval: None,
            reconnecting: false,
            phase: ConnectionPhase::Disconnected,
            heartbeat_acked: true,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            token: self.token.clone(),
            session_id: self.session_id.clone(),
            sequence: self.sequence,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn application_id(&self) -> Option<&str> {
        self.application_id.as_deref()
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    /// Record a dispatch sequence number. Never moves backwards.
    pub fn observe_sequence(&mut self, seq: u64) {
        self.sequence = Some(self.sequence.map_or(seq, |current| current.max(seq)));
    }

    pub fn set_heartbeat_interval(&mut self, interval: Duration) {
        self.heartbeat_interval = Some(interval);
        // Fresh socket, nothing in flight
        self.heartbeat_acked = true;
    }

    pub fn set_phase(&mut self, phase: ConnectionPhase) {
        self.phase = phase;
    }

    pub fn set_reconnecting(&mut self, reconnecting: bool) {
        self.reconnecting = reconnecting;
    }

    pub fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }

    pub fn resume_payload(&self) -> Option<ResumePayload> {
        Some(ResumePayload {
            token: self.token.expose().to_string(),
            session_id: self.session_id.clone()?,
            seq: self.sequence?,
        })
    }

    pub fn identify_payload(&self, properties: ConnectionProperties) -> IdentifyPayload {
        IdentifyPayload {
            token: self.token.expose().to_string(),
            intents: INTENTS,
            properties,
        }
    }

    /// Forget the session so the next handshake is a fresh IDENTIFY.
    pub fn invalidate(&mut self) {
        self.session_id = None;
        self.sequence = None;
    }

    pub fn mark_ready(&mut self, ready: &Ready) {
        self.session_id = Some(ready.session_id.clone());
        self.application_id = Some(ready.application.id.clone());
        self.phase = ConnectionPhase::Ready;
    }

    pub fn heartbeat_sent(&mut self) {
        self.heartbeat_acked = false;
    }

    pub fn heartbeat_acked(&mut self) {
        self.heartbeat_acked = true;
    }

    pub fn is_heartbeat_acked(&self) -> bool {
        self.heartbeat_acked
    }
}
