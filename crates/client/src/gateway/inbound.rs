//! Inbound receiver loop: read a frame, decode it, hand it to the protocol
//! handler. Any failure ends the run.

use std::sync::Arc;

use distodo_shared::GatewayEvent;
use tracing::{debug, error, trace};

use super::connection::RunFlag;
use super::handler::ProtocolHandler;
use super::transport::Transport;

pub(crate) async fn run_inbound(
    transport: Arc<dyn Transport>,
    handler: ProtocolHandler,
    running: RunFlag,
) {
    while running.is_running() {
        let received = tokio::select! {
            received = transport.receive() => received,
            _ = running.stopped() => break,
        };
        let text = match received {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Gateway receive failed");
                running.stop();
                break;
            }
        };
        trace!(frame = %text, "Received frame");

        let event = match GatewayEvent::decode(&text) {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "Failed to decode gateway frame");
                running.stop();
                break;
            }
        };

        if let Err(e) = handler.handle(event).await {
            error!(error = %e, "Protocol handler failed");
            running.stop();
            break;
        }
    }
    debug!("Inbound receiver stopped");
}
