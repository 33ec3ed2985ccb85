//! Error types for the gateway connection.

use distodo_shared::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// The socket could not be opened.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A read or write on an open socket failed, or the peer closed it.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(#[from] ProtocolError),

    /// An outbound message could not be serialized.
    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// An interaction arrived for a custom id with no registered handler.
    #[error("No interaction handler registered for custom id {0:?}")]
    RegistryMiss(String),

    /// The outbound or callback queue was closed.
    #[error("Queue closed: {0}")]
    QueueClosed(&'static str),
}
