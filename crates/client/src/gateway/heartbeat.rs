//! Heartbeat driver.
//!
//! Waits for the interval announced by HELLO, then enqueues a heartbeat
//! carrying the latest sequence once per interval. Beats are skipped while a
//! reconnect is in progress.

use std::sync::Arc;
use std::time::Duration;

use distodo_shared::GatewayFrame;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, trace, warn};

use super::connection::RunFlag;
use super::outbound::OutboundQueue;
use super::session::Session;

pub(crate) struct HeartbeatDriver {
    pub session: Arc<Mutex<Session>>,
    pub interval: watch::Receiver<Option<Duration>>,
    pub outbound: OutboundQueue,
    pub running: RunFlag,
    /// Stop the run when a beat finds the previous one unacknowledged.
    pub require_ack: bool,
}

impl HeartbeatDriver {
    pub(crate) async fn run(mut self) {
        let Some(mut interval) = self.wait_for_interval().await else {
            debug!("Heartbeat driver stopped before HELLO");
            return;
        };
        debug!(interval_ms = interval.as_millis() as u64, "Heartbeat driver started");

        while self.running.is_running() {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.running.stopped() => break,
            }

            // A HELLO on a new socket may renegotiate the interval
            if let Some(latest) = *self.interval.borrow_and_update() {
                interval = latest;
            }

            let frame = {
                let mut session = self.session.lock().await;
                if session.is_reconnecting() {
                    debug!("Reconnect in progress, skipping heartbeat");
                    continue;
                }
                if self.require_ack && !session.is_heartbeat_acked() {
                    warn!("Previous heartbeat was never acknowledged");
                    self.running.stop();
                    break;
                }
                session.heartbeat_sent();
                GatewayFrame::heartbeat(session.sequence())
            };

            trace!(seq = ?frame.d, "Heartbeat");
            if let Err(e) = self.outbound.push(&frame) {
                error!(error = %e, "Failed to enqueue heartbeat");
                self.running.stop();
                break;
            }
        }
        debug!("Heartbeat driver stopped");
    }

    async fn wait_for_interval(&mut self) -> Option<Duration> {
        let running = self.running.clone();
        tokio::select! {
            interval = self.interval.wait_for(Option::is_some) => {
                interval.ok().and_then(|interval| *interval)
            }
            _ = running.stopped() => None,
        }
    }
}
