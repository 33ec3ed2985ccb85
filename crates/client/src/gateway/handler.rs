//! Protocol state machine.
//!
//! Applies one decoded [`GatewayEvent`] at a time to the session: replies to
//! HELLO with IDENTIFY or RESUME, tracks sequence numbers, routes
//! MESSAGE_CREATE and INTERACTION_CREATE to registered handlers, and drives
//! the RECONNECT and INVALID_SESSION recovery paths.

use std::sync::Arc;
use std::time::Duration;

use distodo_shared::{DispatchEvent, GatewayEvent, GatewayFrame, Interaction, InteractionType};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use super::connection::{GatewayConfig, InteractionMissPolicy, RunFlag};
use super::error::GatewayError;
use super::outbound::OutboundQueue;
use super::registry::{Registry, RoutedCallback};
use super::session::{ConnectionPhase, Session};
use super::transport::Transport;

pub(crate) struct ProtocolHandler {
    pub session: Arc<Mutex<Session>>,
    pub registry: Arc<Registry>,
    pub transport: Arc<dyn Transport>,
    pub outbound: OutboundQueue,
    pub callbacks: mpsc::UnboundedSender<RoutedCallback>,
    pub interval: watch::Sender<Option<Duration>>,
    pub running: RunFlag,
    pub config: Arc<GatewayConfig>,
    /// Fully built connect URL, reused on reconnect.
    pub url: String,
}

impl ProtocolHandler {
    pub(crate) async fn handle(&self, event: GatewayEvent) -> Result<(), GatewayError> {
        match event {
            GatewayEvent::Hello { heartbeat_interval } => self.on_hello(heartbeat_interval).await,
            GatewayEvent::Dispatch { seq, event } => {
                if let Some(seq) = seq {
                    self.session.lock().await.observe_sequence(seq);
                }
                self.on_dispatch(event).await
            }
            GatewayEvent::Heartbeat => {
                let frame = {
                    let mut session = self.session.lock().await;
                    session.heartbeat_sent();
                    GatewayFrame::heartbeat(session.sequence())
                };
                debug!("Server requested heartbeat");
                self.outbound.push(&frame)
            }
            GatewayEvent::HeartbeatAck => {
                self.session.lock().await.heartbeat_acked();
                debug!("Heartbeat acknowledged");
                Ok(())
            }
            GatewayEvent::Reconnect => self.on_reconnect().await,
            GatewayEvent::InvalidSession { resumable } => self.on_invalid_session(resumable).await,
            GatewayEvent::Unknown { op } => {
                error!(op, "Unhandled opcode");
                Ok(())
            }
        }
    }

    async fn on_hello(&self, interval: Duration) -> Result<(), GatewayError> {
        let frame = {
            let mut session = self.session.lock().await;
            session.set_heartbeat_interval(interval);
            if session.phase().is_handshaking() {
                warn!(phase = ?session.phase(), "HELLO while a handshake is outstanding");
                None
            } else {
                Some(self.begin_handshake(&mut session))
            }
        };
        info!(interval_ms = interval.as_millis() as u64, "Gateway HELLO");
        self.interval.send_replace(Some(interval));
        match frame {
            Some(frame) => self.outbound.push(&frame),
            None => Ok(()),
        }
    }

    /// RESUME when the session can be resumed, IDENTIFY otherwise.
    fn begin_handshake(&self, session: &mut Session) -> GatewayFrame {
        match session.resume_payload() {
            Some(resume) => {
                info!(session_id = %resume.session_id, seq = resume.seq, "Resuming session");
                session.set_phase(ConnectionPhase::Resuming);
                GatewayFrame::resume(&resume)
            }
            None => {
                info!("Identifying");
                session.set_phase(ConnectionPhase::Identifying);
                GatewayFrame::identify(&session.identify_payload(self.config.properties.clone()))
            }
        }
    }

    async fn on_dispatch(&self, event: DispatchEvent) -> Result<(), GatewayError> {
        match event {
            DispatchEvent::Ready(ready) => {
                self.session.lock().await.mark_ready(&ready);
                info!(
                    session_id = %ready.session_id,
                    application_id = %ready.application.id,
                    "Session ready"
                );
                Ok(())
            }
            DispatchEvent::Resumed => {
                self.session.lock().await.set_phase(ConnectionPhase::Ready);
                info!("Session resumed");
                Ok(())
            }
            DispatchEvent::TypingStart => {
                debug!("TYPING_START");
                Ok(())
            }
            DispatchEvent::MessageCreate(message) => {
                match self.registry.commands.route(*message) {
                    Some(callback) => self.enqueue(callback),
                    None => Ok(()),
                }
            }
            DispatchEvent::InteractionCreate(interaction) => self.on_interaction(*interaction),
            DispatchEvent::Other(name) => {
                debug!(event = %name, "Ignoring dispatch");
                Ok(())
            }
        }
    }

    fn on_interaction(&self, interaction: Interaction) -> Result<(), GatewayError> {
        match interaction.kind {
            InteractionType::Ping => info!("Interaction PING"),
            InteractionType::ApplicationCommand => info!("Interaction APPLICATION_COMMAND"),
            InteractionType::ApplicationCommandAutocomplete => {
                info!("Interaction APPLICATION_COMMAND_AUTOCOMPLETE")
            }
            InteractionType::MessageComponent | InteractionType::ModalSubmit => {
                let custom_id = interaction.custom_id().unwrap_or_default().to_string();
                match self.registry.interactions.lookup(&custom_id) {
                    Some(handler) => {
                        return self.enqueue(RoutedCallback::Interaction {
                            custom_id,
                            handler,
                            interaction,
                        })
                    }
                    None => match self.config.interaction_miss {
                        InteractionMissPolicy::Fatal => {
                            return Err(GatewayError::RegistryMiss(custom_id))
                        }
                        InteractionMissPolicy::Ignore => {
                            warn!(custom_id = %custom_id, "No handler for interaction")
                        }
                    },
                }
            }
            InteractionType::Unknown(kind) => warn!(kind, "Unknown interaction type"),
        }
        Ok(())
    }

    fn enqueue(&self, callback: RoutedCallback) -> Result<(), GatewayError> {
        debug!(callback = %callback.label(), "Queued callback");
        self.callbacks
            .send(callback)
            .map_err(|_| GatewayError::QueueClosed("callbacks"))
    }

    async fn on_reconnect(&self) -> Result<(), GatewayError> {
        info!("Server requested reconnect");
        self.session.lock().await.set_reconnecting(true);

        let result = self.transport.reconnect(&self.url).await;

        let mut session = self.session.lock().await;
        session.set_reconnecting(false);
        match &result {
            Ok(()) => {
                session.set_phase(ConnectionPhase::AwaitingHello);
                info!("Reconnected, awaiting HELLO");
            }
            Err(_) => session.set_phase(ConnectionPhase::Disconnected),
        }
        result
    }

    async fn on_invalid_session(&self, resumable: bool) -> Result<(), GatewayError> {
        warn!(resumable, "Session invalidated");
        tokio::select! {
            _ = tokio::time::sleep(self.config.invalid_session_backoff) => {}
            _ = self.running.stopped() => return Ok(()),
        }

        let frame = {
            let mut session = self.session.lock().await;
            if !resumable {
                session.invalidate();
            }
            self.begin_handshake(&mut session)
        };
        self.outbound.push(&frame)
    }
}
