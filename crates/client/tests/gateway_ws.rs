//! Drives the real WebSocket transport against a local gateway stand-in.

use std::time::Duration;

use distodo_client::{Gateway, GatewayConfig, SessionSnapshot};
use distodo_shared::Message as ChatMessage;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

type ServerSocket = WebSocketStream<TcpStream>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn listen() -> (TcpListener, GatewayConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = GatewayConfig {
        url: format!("ws://{}", listener.local_addr().unwrap()),
        ..GatewayConfig::default()
    };
    (listener, config)
}

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

async fn send(ws: &mut ServerSocket, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

async fn recv(ws: &mut ServerSocket) -> Value {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            _ => continue,
        }
    }
}

fn hello() -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": 45000}, "s": null, "t": null})
}

fn ready(seq: u64) -> Value {
    json!({
        "op": 0, "s": seq, "t": "READY",
        "d": {
            "session_id": "abc",
            "application": {"id": "app"},
            "user": {"id": "bot", "username": "distodo", "bot": true}
        }
    })
}

#[tokio::test]
async fn identifies_routes_commands_and_returns_session() {
    init_tracing();
    let (listener, config) = listen().await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    let mut gateway = Gateway::new("tok", config);
    gateway.register_command('!', "todo", move |message: ChatMessage, args: Option<String>| {
        let seen_tx = seen_tx.clone();
        async move {
            seen_tx.send((message.channel_id, args)).unwrap();
            Ok::<(), anyhow::Error>(())
        }
    });
    let client = tokio::spawn(gateway.run());

    let mut ws = accept(&listener).await;
    send(&mut ws, hello()).await;
    let identify = recv(&mut ws).await;
    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["token"], "tok");
    assert_eq!(identify["d"]["intents"], 3584);
    assert_eq!(identify["d"]["properties"]["browser"], "distodo");

    send(&mut ws, ready(1)).await;
    send(
        &mut ws,
        json!({
            "op": 0, "s": 2, "t": "MESSAGE_CREATE",
            "d": {"id": "m1", "channel_id": "c1", "content": "!todo buy milk"}
        }),
    )
    .await;
    send(
        &mut ws,
        json!({
            "op": 0, "s": 3, "t": "MESSAGE_CREATE",
            "d": {"id": "m2", "channel_id": "c1", "content": "!unknown x"}
        }),
    )
    .await;

    let seen = tokio::time::timeout(Duration::from_secs(10), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen, ("c1".to_string(), Some("buy milk".to_string())));

    ws.close(None).await.unwrap();
    let snapshot: SessionSnapshot = tokio::time::timeout(Duration::from_secs(10), client)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.session_id.as_deref(), Some("abc"));
    assert_eq!(snapshot.sequence, Some(3));
    assert!(seen_rx.try_recv().is_err());
}

#[tokio::test]
async fn reconnect_opcode_resumes_on_a_new_socket() {
    init_tracing();
    let (listener, config) = listen().await;
    let client = tokio::spawn(Gateway::new("tok", config).run());

    let mut first = accept(&listener).await;
    send(&mut first, hello()).await;
    assert_eq!(recv(&mut first).await["op"], 2);
    send(&mut first, ready(1)).await;
    send(&mut first, json!({"op": 7, "d": null})).await;

    let mut second = accept(&listener).await;
    drop(first);
    send(&mut second, hello()).await;
    assert_eq!(
        recv(&mut second).await,
        json!({"op": 6, "d": {"token": "tok", "session_id": "abc", "seq": 1}})
    );
    send(&mut second, json!({"op": 0, "s": 2, "t": "RESUMED", "d": null})).await;
    second.close(None).await.unwrap();

    let snapshot = tokio::time::timeout(Duration::from_secs(10), client)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.session_id.as_deref(), Some("abc"));
    assert_eq!(snapshot.sequence, Some(2));
}

#[tokio::test]
async fn refused_connection_returns_prior_snapshot() {
    init_tracing();
    let (listener, config) = listen().await;
    drop(listener);

    let prior = SessionSnapshot {
        session_id: Some("abc".into()),
        sequence: Some(9),
        ..SessionSnapshot::new("tok")
    };
    let snapshot = Gateway::from_snapshot(prior.clone(), config).run().await;
    assert_eq!(snapshot, prior);
}
