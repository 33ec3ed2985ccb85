//! In-memory [`Transport`] for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use super::error::GatewayError;
use super::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransportOp {
    Open(String),
    Close,
}

pub(crate) struct MockTransport {
    inbound: Mutex<mpsc::UnboundedReceiver<String>>,
    sent: mpsc::UnboundedSender<String>,
    ops: StdMutex<Vec<TransportOp>>,
    fail_open: AtomicBool,
}

/// The server side of a [`MockTransport`].
pub(crate) struct MockRemote {
    inbound: Option<mpsc::UnboundedSender<String>>,
    sent: mpsc::UnboundedReceiver<String>,
}

impl MockTransport {
    pub(crate) fn new() -> (Arc<Self>, MockRemote) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            inbound: Mutex::new(inbound_rx),
            sent: sent_tx,
            ops: StdMutex::new(Vec::new()),
            fail_open: AtomicBool::new(false),
        });
        let remote = MockRemote {
            inbound: Some(inbound_tx),
            sent: sent_rx,
        };
        (transport, remote)
    }

    pub(crate) fn ops(&self) -> Vec<TransportOp> {
        self.ops.lock().unwrap().clone()
    }

    pub(crate) fn fail_next_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &str) -> Result<(), GatewayError> {
        self.ops.lock().unwrap().push(TransportOp::Open(url.to_string()));
        if self.fail_open.swap(false, Ordering::SeqCst) {
            return Err(GatewayError::Connection("refused".into()));
        }
        Ok(())
    }

    async fn send(&self, text: String) -> Result<(), GatewayError> {
        self.sent
            .send(text)
            .map_err(|_| GatewayError::Transport("remote gone".into()))
    }

    async fn receive(&self) -> Result<String, GatewayError> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| GatewayError::Transport("closed by peer".into()))
    }

    async fn close(&self) {
        self.ops.lock().unwrap().push(TransportOp::Close);
    }
}

impl MockRemote {
    /// Deliver a frame to the client.
    pub(crate) fn push(&self, frame: Value) {
        if let Some(inbound) = &self.inbound {
            inbound.send(frame.to_string()).unwrap();
        }
    }

    /// Simulate the peer closing the socket.
    pub(crate) fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Next frame the client wrote.
    pub(crate) async fn next_sent(&mut self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(60), self.sent.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client transport dropped");
        serde_json::from_str(&text).unwrap()
    }

    pub(crate) fn try_next_sent(&mut self) -> Option<Value> {
        self.sent
            .try_recv()
            .ok()
            .map(|text| serde_json::from_str(&text).unwrap())
    }
}
