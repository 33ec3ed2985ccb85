//! Connection lifecycle: configuration, the public [`Gateway`] and
//! [`GatewayHandle`], and the run loop that joins the four connection tasks.

use std::sync::Arc;
use std::time::Duration;

use distodo_shared::{ConnectionProperties, GATEWAY_URL, GATEWAY_VERSION};
use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info};
use url::Url;

use super::error::GatewayError;
use super::executor::run_executor;
use super::handler::ProtocolHandler;
use super::heartbeat::HeartbeatDriver;
use super::inbound::run_inbound;
use super::outbound::{run_outbound, OutboundQueue};
use super::registry::{CommandHandler, InteractionHandler, Registry};
use super::session::{ConnectionPhase, Session, SessionSnapshot, Token};
use super::transport::{Transport, WsTransport};

/// What to do with a component interaction whose custom id has no handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMissPolicy {
    /// End the run with [`GatewayError::RegistryMiss`].
    #[default]
    Fatal,
    /// Log and drop the interaction.
    Ignore,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base gateway URL; version and encoding are appended as query params.
    pub url: String,
    pub version: u8,
    pub properties: ConnectionProperties,
    /// Delay before re-handshaking after INVALID_SESSION.
    pub invalid_session_backoff: Duration,
    pub interaction_miss: InteractionMissPolicy,
    /// Treat a heartbeat that is still unacknowledged when the next one is
    /// due as a dead connection.
    pub require_heartbeat_ack: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: GATEWAY_URL.to_string(),
            version: GATEWAY_VERSION,
            properties: ConnectionProperties::default(),
            invalid_session_backoff: Duration::from_secs(5),
            interaction_miss: InteractionMissPolicy::Fatal,
            require_heartbeat_ack: false,
        }
    }
}

impl GatewayConfig {
    /// `{url}/?v={version}&encoding=json`
    pub fn connect_url(&self) -> Result<String, GatewayError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| GatewayError::Connection(format!("Invalid gateway URL: {}", e)))?;
        url.query_pairs_mut()
            .clear()
            .append_pair("v", &self.version.to_string())
            .append_pair("encoding", "json");
        Ok(url.into())
    }
}

/// Configuration for restarting a gateway that has stopped
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of restarts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis((delay as u32).min(self.max_delay_ms) as u64)
    }

    /// Whether `attempt` restarts have used up the budget.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }
}

/// Shared running flag. Any task may clear it; all tasks watch it.
///
/// [`shutdown`](Self::shutdown) also latches a request that a later
/// [`start`](Self::start) cannot undo.
#[derive(Clone)]
pub(crate) struct RunFlag {
    tx: Arc<watch::Sender<bool>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl RunFlag {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        let (shutdown, _rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Mark running. Returns false, leaving the flag cleared, once shutdown
    /// has been requested.
    pub(crate) fn start(&self) -> bool {
        self.tx.send_if_modified(|running| {
            if *self.shutdown.borrow() {
                return false;
            }
            *running = true;
            true
        });
        self.is_running()
    }

    pub(crate) fn stop(&self) {
        self.tx.send_replace(false);
    }

    /// Stop now and refuse any later start.
    pub(crate) fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.stop();
    }

    pub(crate) fn is_running(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the flag is cleared.
    pub(crate) async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|running| !*running).await;
    }

    /// Resolves once shutdown has been requested.
    pub(crate) async fn shutdown_requested(&self) {
        let mut rx = self.shutdown.subscribe();
        let _ = rx.wait_for(|requested| *requested).await;
    }
}

/// Handle for sending frames through a gateway connection
#[derive(Clone)]
pub struct GatewayHandle {
    outbound: OutboundQueue,
    running: RunFlag,
}

impl GatewayHandle {
    /// Enqueue a frame. Returns once queued; there is no delivery confirmation.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), GatewayError> {
        self.outbound.push(message)
    }

    /// Ask the running connection to stop. `Gateway::run` then returns.
    pub fn shutdown(&self) {
        info!("Gateway shutdown requested");
        self.running.shutdown();
    }
}

/// A gateway connection, configured and ready to [`run`](Gateway::run).
pub struct Gateway {
    config: GatewayConfig,
    session: Session,
    registry: Registry,
    transport: Arc<dyn Transport>,
    outbound: OutboundQueue,
    queue: UnboundedReceiver<Value>,
    running: RunFlag,
}

impl Gateway {
    pub fn new(token: impl Into<Token>, config: GatewayConfig) -> Self {
        Self::from_snapshot(SessionSnapshot::new(token), config)
    }

    /// Build a connection that resumes the session a previous run returned.
    pub fn from_snapshot(snapshot: SessionSnapshot, config: GatewayConfig) -> Self {
        let (sender, queue) = unbounded();
        Self {
            config,
            session: Session::from_snapshot(snapshot),
            registry: Registry::default(),
            transport: Arc::new(WsTransport::new()),
            outbound: OutboundQueue::new(sender),
            queue,
            running: RunFlag::new(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn register_command<H>(
        &mut self,
        prefix: char,
        name: impl Into<String>,
        handler: H,
    ) -> &mut Self
    where
        H: CommandHandler + 'static,
    {
        self.registry.commands.register(prefix, name, handler);
        self
    }

    pub fn register_interaction<H>(
        &mut self,
        custom_id: impl Into<String>,
        handler: H,
    ) -> &mut Self
    where
        H: InteractionHandler + 'static,
    {
        self.registry.interactions.register(custom_id, handler);
        self
    }

    pub fn handle(&self) -> GatewayHandle {
        GatewayHandle {
            outbound: self.outbound.clone(),
            running: self.running.clone(),
        }
    }

    /// Open the connection and run until any task fails or the handle asks to
    /// stop. Returns the session snapshot so the caller can resume later.
    pub async fn run(self) -> SessionSnapshot {
        let Gateway {
            config,
            session,
            registry,
            transport,
            outbound,
            queue,
            running,
        } = self;
        let session = Arc::new(Mutex::new(session));

        let url = match config.connect_url() {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "Cannot build gateway URL");
                return session.lock().await.snapshot();
            }
        };

        info!(url = %url, "Connecting to gateway");
        let opened = tokio::select! {
            opened = transport.open(&url) => opened,
            _ = running.shutdown_requested() => {
                info!("Shutdown requested before the gateway connected");
                return session.lock().await.snapshot();
            }
        };
        if let Err(e) = opened {
            error!(error = %e, "Failed to open gateway connection");
            return session.lock().await.snapshot();
        }
        if !running.start() {
            info!("Shutdown requested while connecting");
            transport.close().await;
            return session.lock().await.snapshot();
        }
        session.lock().await.set_phase(ConnectionPhase::AwaitingHello);

        let config = Arc::new(config);
        let (interval_tx, interval_rx) = watch::channel(None);
        let (callback_tx, callback_rx) = mpsc::unbounded_channel();

        let handler = ProtocolHandler {
            session: session.clone(),
            registry: Arc::new(registry),
            transport: transport.clone(),
            outbound: outbound.clone(),
            callbacks: callback_tx,
            interval: interval_tx,
            running: running.clone(),
            config: config.clone(),
            url,
        };
        let heartbeat = HeartbeatDriver {
            session: session.clone(),
            interval: interval_rx,
            outbound,
            running: running.clone(),
            require_ack: config.require_heartbeat_ack,
        };

        tokio::join!(
            run_outbound(queue, transport.clone(), running.clone()),
            run_inbound(transport.clone(), handler, running.clone()),
            heartbeat.run(),
            run_executor(callback_rx, running.clone()),
        );

        transport.close().await;
        let mut session = session.lock().await;
        session.set_phase(ConnectionPhase::Disconnected);
        info!(
            session_id = ?session.session_id(),
            seq = ?session.sequence(),
            "Gateway connection closed"
        );
        session.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{MockTransport, TransportOp};
    use distodo_shared::Message;
    use serde_json::json;

    fn config() -> GatewayConfig {
        GatewayConfig {
            url: "ws://gateway.test".into(),
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn connect_url_appends_version_and_encoding() {
        assert_eq!(
            GatewayConfig::default().connect_url().unwrap(),
            "wss://gateway.discord.gg/?v=9&encoding=json"
        );
    }

    #[test]
    fn connect_url_rejects_garbage() {
        let config = GatewayConfig {
            url: "not a url".into(),
            ..GatewayConfig::default()
        };
        assert!(matches!(
            config.connect_url(),
            Err(GatewayError::Connection(_))
        ));
    }

    #[test]
    fn reconnect_delay_grows_and_caps() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1500));
        assert_eq!(config.delay_for_attempt(20), Duration::from_millis(30000));
        assert!(!config.exhausted(9));
        assert!(config.exhausted(10));
        let unlimited = ReconnectConfig {
            max_attempts: 0,
            ..ReconnectConfig::default()
        };
        assert!(!unlimited.exhausted(1000));
    }

    #[test]
    fn shutdown_latch_outlives_start() {
        let running = RunFlag::new();
        assert!(running.start());
        running.shutdown();
        assert!(!running.is_running());
        assert!(!running.start());
        assert!(!running.is_running());
    }

    #[tokio::test]
    async fn shutdown_before_run_is_not_lost() {
        let (transport, _remote) = MockTransport::new();
        let gateway = Gateway::new("tok", config()).with_transport(transport.clone());
        let handle = gateway.handle();
        handle.shutdown();

        let snapshot = tokio::time::timeout(Duration::from_secs(10), gateway.run())
            .await
            .unwrap();
        assert_eq!(snapshot.session_id, None);
        assert!(matches!(
            transport.ops().as_slice(),
            [] | [TransportOp::Open(_), TransportOp::Close]
        ));
    }

    #[tokio::test]
    async fn out_of_range_opcode_keeps_the_connection_running() {
        let (transport, mut remote) = MockTransport::new();
        let gateway = Gateway::new("tok", config()).with_transport(transport);
        let handle = gateway.handle();
        let run = tokio::spawn(gateway.run());

        remote.push(json!({"op": 256, "d": null}));
        remote.push(json!({"op": 10, "d": {"heartbeat_interval": 45000}}));
        let identify = remote.next_sent().await;
        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], "tok");

        handle.shutdown();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn failed_open_returns_snapshot_untouched() {
        let (transport, _remote) = MockTransport::new();
        transport.fail_next_open();
        let snapshot = SessionSnapshot {
            token: Token::new("tok"),
            session_id: Some("abc".into()),
            sequence: Some(4),
        };
        let gateway = Gateway::from_snapshot(snapshot.clone(), config()).with_transport(transport);
        assert_eq!(gateway.run().await, snapshot);
    }

    #[tokio::test]
    async fn run_identifies_routes_and_returns_session_on_close() {
        let (transport, mut remote) = MockTransport::new();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        let mut gateway = Gateway::new("tok", config()).with_transport(transport.clone());
        gateway.register_command('!', "todo", move |_m: Message, args: Option<String>| {
            let seen_tx = seen_tx.clone();
            async move {
                seen_tx.send(args).unwrap();
                Ok::<(), anyhow::Error>(())
            }
        });
        let run = tokio::spawn(gateway.run());

        remote.push(json!({"op": 10, "d": {"heartbeat_interval": 45000}}));
        let identify = remote.next_sent().await;
        assert_eq!(identify["op"], 2);

        remote.push(json!({
            "op": 0, "s": 1, "t": "READY",
            "d": {"session_id": "abc", "application": {"id": "app"}}
        }));
        remote.push(json!({
            "op": 0, "s": 2, "t": "MESSAGE_CREATE",
            "d": {"id": "1", "channel_id": "2", "content": "!todo buy milk"}
        }));
        assert_eq!(seen_rx.recv().await.unwrap().as_deref(), Some("buy milk"));

        remote.hang_up();
        let snapshot = run.await.unwrap();
        assert_eq!(snapshot.session_id.as_deref(), Some("abc"));
        assert_eq!(snapshot.sequence, Some(2));
        assert_eq!(
            transport.ops(),
            vec![
                TransportOp::Open("ws://gateway.test/?v=9&encoding=json".into()),
                TransportOp::Close
            ]
        );
    }

    #[tokio::test]
    async fn queued_messages_leave_in_enqueue_order() {
        let (transport, mut remote) = MockTransport::new();
        let gateway = Gateway::new("tok", config()).with_transport(transport);
        let handle = gateway.handle();
        handle.send(&json!({"op": 3, "d": "A"})).unwrap();
        handle.send(&json!({"op": 3, "d": "B"})).unwrap();
        let run = tokio::spawn(gateway.run());
        handle.send(&json!({"op": 3, "d": "C"})).unwrap();

        assert_eq!(remote.next_sent().await["d"], "A");
        assert_eq!(remote.next_sent().await["d"], "B");
        assert_eq!(remote.next_sent().await["d"], "C");

        handle.shutdown();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn resumes_from_snapshot_on_hello() {
        let (transport, mut remote) = MockTransport::new();
        let snapshot = SessionSnapshot {
            token: Token::new("tok"),
            session_id: Some("abc".into()),
            sequence: Some(17),
        };
        let gateway = Gateway::from_snapshot(snapshot, config()).with_transport(transport);
        let handle = gateway.handle();
        let run = tokio::spawn(gateway.run());

        remote.push(json!({"op": 10, "d": {"heartbeat_interval": 45000}}));
        assert_eq!(
            remote.next_sent().await,
            json!({"op": 6, "d": {"token": "tok", "session_id": "abc", "seq": 17}})
        );

        handle.shutdown();
        let snapshot = run.await.unwrap();
        assert_eq!(snapshot.sequence, Some(17));
    }

    #[tokio::test]
    async fn malformed_frame_ends_the_run() {
        let (transport, remote) = MockTransport::new();
        let gateway = Gateway::new("tok", config()).with_transport(transport.clone());
        let run = tokio::spawn(gateway.run());

        remote.push(json!("not an envelope"));
        let snapshot = run.await.unwrap();
        assert_eq!(snapshot.session_id, None);
        assert_eq!(transport.ops().last(), Some(&TransportOp::Close));
    }

    #[tokio::test]
    async fn unregistered_interaction_ends_the_run_by_default() {
        let (transport, mut remote) = MockTransport::new();
        let gateway = Gateway::new("tok", config()).with_transport(transport);
        let run = tokio::spawn(gateway.run());

        remote.push(json!({"op": 10, "d": {"heartbeat_interval": 45000}}));
        remote.next_sent().await;
        remote.push(json!({
            "op": 0, "s": 3, "t": "INTERACTION_CREATE",
            "d": {
                "id": "9", "application_id": "app", "type": 3, "token": "itok",
                "data": {"custom_id": "mystery", "component_type": 2}
            }
        }));
        let snapshot = run.await.unwrap();
        assert_eq!(snapshot.sequence, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_follow_hello_interval() {
        let (transport, mut remote) = MockTransport::new();
        let gateway = Gateway::new("tok", config()).with_transport(transport);
        let handle = gateway.handle();
        let run = tokio::spawn(gateway.run());

        remote.push(json!({"op": 10, "d": {"heartbeat_interval": 1000}}));
        assert_eq!(remote.next_sent().await["op"], 2);
        remote.push(json!({
            "op": 0, "s": 5, "t": "READY",
            "d": {"session_id": "abc", "application": {"id": "app"}}
        }));

        assert_eq!(remote.next_sent().await, json!({"op": 1, "d": 5}));
        remote.push(json!({"op": 11, "d": null}));
        assert_eq!(remote.next_sent().await, json!({"op": 1, "d": 5}));
        assert!(remote.try_next_sent().is_none());

        handle.shutdown();
        run.await.unwrap();
    }
}
