//! End-to-end tests for the adapter against a local broker.
//!
//! Each test starts a tokio-tungstenite server on an ephemeral localhost port
//! that plays the broker's side of the protocol, and runs the real
//! `BrokerConnection` event loop with the loopback handler against it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use amp_adapter::application::{AdapterCore, Handler, HandlerError, ResponseSink, SutEvent};
use amp_adapter::domain::{BrokerConfig, StimulusFailurePolicy};
use amp_adapter::infrastructure::handler::loopback_handler;
use amp_adapter::infrastructure::BrokerConnection;
use amp_core::protocol::{
    decode_envelope, encode_envelope, envelope, Configuration, Envelope, Label, LabelType, Value,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use url::Url;

const TOKEN: &str = "t0k3n";
const SESSION: &str = "test@loopback";
const TIMEOUT: Duration = Duration::from_secs(10);

type BrokerSide = WebSocketStream<TcpStream>;

// ── Broker helpers ────────────────────────────────────────────────────────────

/// Accepts one adapter connection, recording its Authorization header.
async fn accept(listener: &TcpListener, auth: Arc<Mutex<Option<String>>>) -> BrokerSide {
    let (stream, _) = listener.accept().await.expect("accept");
    tokio_tungstenite::accept_hdr_async(stream, move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let header = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *auth.lock().unwrap() = header;
        Ok(resp)
    })
    .await
    .expect("websocket handshake")
}

/// Next binary envelope from the adapter, skipping control frames.
async fn recv_envelope(ws: &mut BrokerSide) -> Envelope {
    loop {
        match ws.next().await.expect("adapter closed early").expect("read") {
            Message::Binary(bytes) => return decode_envelope(&bytes).expect("valid envelope"),
            Message::Close(frame) => panic!("adapter closed early: {frame:?}"),
            _ => continue,
        }
    }
}

async fn send_envelope(ws: &mut BrokerSide, envelope: Envelope) {
    ws.send(Message::Binary(encode_envelope(&envelope)))
        .await
        .expect("send");
}

/// Reads until the adapter's close frame and returns its reason.
async fn recv_close_reason(ws: &mut BrokerSide) -> String {
    while let Some(frame) = ws.next().await {
        if let Ok(Message::Close(Some(close))) = frame {
            return close.reason.into_owned();
        }
    }
    panic!("connection ended without a close frame");
}

/// Completes the handshake up to Ready and returns the announcement.
async fn handshake(ws: &mut BrokerSide) -> Envelope {
    let announcement = recv_envelope(ws).await;
    send_envelope(ws, Envelope::configuration(Configuration::default())).await;
    assert_eq!(recv_envelope(ws).await, Envelope::ready());
    announcement
}

// ── Adapter helpers ───────────────────────────────────────────────────────────

fn spawn_adapter(
    addr: SocketAddr,
) -> (JoinHandle<anyhow::Result<()>>, oneshot::Sender<()>) {
    let (sink, sut_events) = ResponseSink::channel();
    spawn_adapter_with(addr, Arc::new(loopback_handler(sink, true)), sut_events)
}

fn spawn_adapter_with(
    addr: SocketAddr,
    handler: Arc<dyn Handler>,
    sut_events: mpsc::UnboundedReceiver<SutEvent>,
) -> (JoinHandle<anyhow::Result<()>>, oneshot::Sender<()>) {
    let url = Url::parse(&format!("ws://{addr}/adapter")).unwrap();
    let broker = BrokerConfig {
        url: url.to_string(),
        token: TOKEN.into(),
        ..Default::default()
    };

    let (connection, link) = BrokerConnection::new(url, &broker);
    let core = AdapterCore::new(SESSION, handler, Arc::new(link), StimulusFailurePolicy::Confirm);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let task = tokio::spawn(connection.run(core, sut_events, shutdown_rx));
    (task, shutdown_tx)
}

/// Handler that only counts how often the core reached into it.
#[derive(Default)]
struct CountingHandler {
    starts: AtomicUsize,
    stimuli: AtomicUsize,
}

impl Handler for CountingHandler {
    fn supported_labels(&self) -> Vec<Label> {
        vec![Label::declare("echo", LabelType::Stimulus, &[("text", "string")])]
    }

    fn start(&self) -> Result<(), HandlerError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {}

    fn reset(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn stimulate(&self, label: &Label) -> Result<Option<String>, HandlerError> {
        self.stimuli.fetch_add(1, Ordering::SeqCst);
        Ok(Some(label.name.clone()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_session_from_announcement_to_broker_error() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let auth = Arc::new(Mutex::new(None));
    let (adapter, _shutdown) = spawn_adapter(addr);

    let broker = async {
        let mut ws = accept(&listener, Arc::clone(&auth)).await;

        // Handshake
        let announcement = handshake(&mut ws).await;

        // Stimulus → confirmation → response
        let mut stimulus = Label::stimulus("echo").with_param("text", "hello");
        stimulus.correlation_id = Some(42);
        send_envelope(&mut ws, Envelope::label(stimulus)).await;
        let confirmation = recv_envelope(&mut ws).await;
        let response = recv_envelope(&mut ws).await;

        // Broker ends the session
        send_envelope(&mut ws, Envelope::error("test complete")).await;
        let reason = recv_close_reason(&mut ws).await;

        (announcement, confirmation, response, reason)
    };

    // Act
    let (announcement, confirmation, response, reason) =
        tokio::time::timeout(TIMEOUT, broker).await.expect("broker timed out");
    let result = tokio::time::timeout(TIMEOUT, adapter)
        .await
        .expect("adapter timed out")
        .expect("adapter task panicked");

    // Assert
    assert!(result.is_ok(), "adapter failed: {result:?}");
    assert_eq!(auth.lock().unwrap().as_deref(), Some("Bearer t0k3n"));

    let Some(envelope::Kind::Announcement(announcement)) = announcement.kind else {
        panic!("expected announcement first");
    };
    assert_eq!(announcement.name, SESSION);
    assert!(announcement.labels.iter().any(|l| l.name == "echo" && l.is_stimulus()));
    assert!(announcement.labels.iter().any(|l| l.name == "echoed" && l.is_response()));

    let Some(envelope::Kind::Label(confirmation)) = confirmation.kind else {
        panic!("expected stimulus confirmation");
    };
    assert_eq!(confirmation.name, "echo");
    assert_eq!(confirmation.correlation_id, Some(42));
    assert_eq!(confirmation.physical_label.as_deref(), Some("echo"));
    assert!(confirmation.timestamp.is_some());

    let Some(envelope::Kind::Label(response)) = response.kind else {
        panic!("expected response label");
    };
    assert_eq!(response.name, "echoed");
    assert!(response.is_response());
    assert_eq!(response.param("text"), Some(Value::from("hello")));

    assert_eq!(reason, "Error message received: test complete");
}

#[tokio::test]
async fn test_reset_returns_to_ready() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (adapter, shutdown) = spawn_adapter(addr);

    let broker = async {
        let mut ws = accept(&listener, Arc::new(Mutex::new(None))).await;
        handshake(&mut ws).await;

        send_envelope(&mut ws, Envelope::reset()).await;
        let after_reset = recv_envelope(&mut ws).await;

        // The worker was restarted, so stimuli still work after the reset.
        send_envelope(&mut ws, Envelope::label(Label::stimulus("ping").with_param("token", 5))).await;
        let _confirmation = recv_envelope(&mut ws).await;
        let pong = recv_envelope(&mut ws).await;

        shutdown.send(()).unwrap();
        let error = recv_envelope(&mut ws).await;
        let reason = recv_close_reason(&mut ws).await;
        (after_reset, pong, error, reason)
    };

    let (after_reset, pong, error, reason) =
        tokio::time::timeout(TIMEOUT, broker).await.expect("broker timed out");
    let result = tokio::time::timeout(TIMEOUT, adapter).await.expect("adapter timed out");

    assert!(matches!(result, Ok(Ok(()))));
    assert_eq!(after_reset, Envelope::ready());
    let Some(envelope::Kind::Label(pong)) = pong.kind else {
        panic!("expected pong");
    };
    assert_eq!(pong.name, "pong");
    assert_eq!(pong.param("token"), Some(Value::Integer(5)));
    assert_eq!(error, Envelope::error("adapter shutting down"));
    assert_eq!(reason, "adapter shutting down");
}

#[tokio::test]
async fn test_out_of_order_label_ends_session_with_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (adapter, _shutdown) = spawn_adapter(addr);

    let broker = async {
        let mut ws = accept(&listener, Arc::new(Mutex::new(None))).await;
        let _announcement = recv_envelope(&mut ws).await;

        // No configuration yet: a stimulus is a protocol violation.
        send_envelope(&mut ws, Envelope::label(Label::stimulus("echo"))).await;
        let error = recv_envelope(&mut ws).await;
        let reason = recv_close_reason(&mut ws).await;
        (error, reason)
    };

    let (error, reason) = tokio::time::timeout(TIMEOUT, broker).await.expect("broker timed out");
    let result = tokio::time::timeout(TIMEOUT, adapter).await.expect("adapter timed out");

    assert!(matches!(result, Ok(Ok(()))));
    assert_eq!(error, Envelope::error("Label received while not ready"));
    assert_eq!(reason, "Label received while not ready");
}

#[tokio::test]
async fn test_frames_after_session_error_never_reach_the_handler() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(CountingHandler::default());
    let (_sink, sut_events) = ResponseSink::channel();
    let (adapter, _shutdown) = spawn_adapter_with(addr, handler.clone(), sut_events);

    let broker = async {
        let mut ws = accept(&listener, Arc::new(Mutex::new(None))).await;
        let _announcement = recv_envelope(&mut ws).await;
        send_envelope(&mut ws, Envelope::label(Label::stimulus("echo"))).await;
        let error = recv_envelope(&mut ws).await;

        // Act: keep talking before acknowledging the adapter's close
        send_envelope(&mut ws, Envelope::configuration(Configuration::default())).await;
        send_envelope(&mut ws, Envelope::label(Label::stimulus("echo"))).await;
        let reason = recv_close_reason(&mut ws).await;
        (error, reason)
    };

    let (error, reason) = tokio::time::timeout(TIMEOUT, broker).await.expect("broker timed out");
    let result = tokio::time::timeout(TIMEOUT, adapter).await.expect("adapter timed out");

    // Assert
    assert!(matches!(result, Ok(Ok(()))));
    assert_eq!(error, Envelope::error("Label received while not ready"));
    assert_eq!(reason, "Label received while not ready");
    assert_eq!(handler.starts.load(Ordering::SeqCst), 0);
    assert_eq!(handler.stimuli.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connect_failure_is_returned() {
    // Arrange: reserve a port, then free it so nothing is listening
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    // Act
    let (adapter, _shutdown) = spawn_adapter(addr);
    let result = tokio::time::timeout(TIMEOUT, adapter)
        .await
        .expect("adapter timed out")
        .expect("adapter task panicked");

    // Assert
    assert!(result.is_err());
}
