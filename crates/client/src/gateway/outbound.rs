//! Outbound queue and the dispatcher loop that drains it.
//!
//! Every frame the client writes goes through one FIFO, so protocol replies,
//! heartbeats and user messages leave the socket in enqueue order.

use std::sync::Arc;

use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, trace};

use super::connection::RunFlag;
use super::error::GatewayError;
use super::transport::Transport;

/// Producer side of the outbound FIFO.
#[derive(Clone)]
pub(crate) struct OutboundQueue {
    sender: UnboundedSender<Value>,
}

impl OutboundQueue {
    pub(crate) fn new(sender: UnboundedSender<Value>) -> Self {
        Self { sender }
    }

    /// Serialize and enqueue. Never blocks.
    pub(crate) fn push<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), GatewayError> {
        let value = serde_json::to_value(message).map_err(GatewayError::Encode)?;
        self.sender
            .unbounded_send(value)
            .map_err(|_| GatewayError::QueueClosed("outbound"))
    }
}

/// Write queued messages to the transport until the run flag drops.
///
/// A failed write is fatal for the run.
pub(crate) async fn run_outbound(
    mut queue: UnboundedReceiver<Value>,
    transport: Arc<dyn Transport>,
    running: RunFlag,
) {
    while running.is_running() {
        let message = tokio::select! {
            message = queue.next() => message,
            _ = running.stopped() => break,
        };
        let Some(message) = message else {
            debug!("Outbound queue closed");
            running.stop();
            break;
        };

        let text = message.to_string();
        trace!(frame = %text, "Sending frame");
        if let Err(e) = transport.send(text).await {
            error!(error = %e, "Outbound send failed");
            running.stop();
            break;
        }
    }
    debug!("Outbound dispatcher stopped");
}
