//! Real-time gateway connection.
//!
//! ```text
//!                 ┌──────────────┐  frames   ┌──────────────────┐
//!   socket ──────►│   inbound    │──────────►│ ProtocolHandler  │──► Session
//!                 └──────────────┘           └──────────────────┘
//!                                              │            │
//!                                   replies    │            │ routed callbacks
//!                                              ▼            ▼
//!   socket ◄───── outbound ◄──── FIFO ◄── heartbeat     executor ──► handlers
//! ```
//!
//! [`Gateway::run`] joins the four tasks. Any of them clearing the running
//! flag ends the run; the caller gets back a [`SessionSnapshot`] it can hand
//! to [`Gateway::from_snapshot`] to resume.

mod connection;
mod error;
mod executor;
mod handler;
mod heartbeat;
mod inbound;
mod outbound;
pub mod registry;
mod session;
mod transport;

#[cfg(test)]
mod testing;

pub use connection::{Gateway, GatewayConfig, GatewayHandle, InteractionMissPolicy, ReconnectConfig};
pub use error::GatewayError;
pub use registry::{CommandHandler, InteractionHandler, RoutedCallback};
pub use session::{ConnectionPhase, Session, SessionSnapshot, Token};
pub use transport::{Transport, WsTransport};
