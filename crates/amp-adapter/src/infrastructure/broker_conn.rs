//! WebSocket connection to the AMP broker.
//!
//! [`BrokerConnection::run`] is the adapter's event loop.  It owns the socket
//! and the [`AdapterCore`], and multiplexes four sources with `tokio::select!`:
//!
//! ```text
//!   broker frames ──► dispatch_message ──► AdapterCore callbacks
//!   LinkCommand queue (from BrokerHandle) ──► socket writes
//!   SutEvent channel (from ResponseSink)  ──► AdapterCore::send_response / report_error
//!   shutdown signal                       ──► AdapterCore::report_error
//! ```
//!
//! Because every core callback runs on this one task, session state needs no
//! locks.  Every outbound frame, whether it originates from a broker message
//! or from a SUT response, goes through the same FIFO command queue, so a
//! stimulus confirmation queued before a response is also written first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use amp_core::protocol::{decode_envelope, encode_envelope, envelope, Envelope, ProtocolError};

use crate::application::adapter_core::AdapterCore;
use crate::application::broker_link::BrokerLink;
use crate::application::handler::SutEvent;
use crate::domain::BrokerConfig;

/// Maximum close-frame reason length allowed by RFC 6455 (125 minus the code).
pub const MAX_CLOSE_REASON: usize = 123;

/// How long to wait for the broker to answer our close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

type BrokerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Work queued by [`BrokerHandle`] for the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCommand {
    Connect,
    Send(Vec<u8>),
    Close { reason: String, code: u16 },
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// The [`BrokerLink`] given to the adapter core.
///
/// Every call turns into a [`LinkCommand`] on an unbounded queue drained by
/// [`BrokerConnection::run`].  The shared `open` flag lets sends and closes on
/// a transport that is not open be refused immediately, on the caller's side.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    commands: mpsc::UnboundedSender<LinkCommand>,
    open: Arc<AtomicBool>,
}

impl BrokerHandle {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn queue(&self, command: LinkCommand) {
        if self.commands.send(command).is_err() {
            warn!("broker event loop has stopped; dropping command");
        }
    }
}

impl BrokerLink for BrokerHandle {
    fn connect(&self) {
        self.queue(LinkCommand::Connect);
    }

    fn send_message(&self, envelope: Envelope) {
        if !self.is_open() {
            warn!(
                "not connected to the broker; dropping {} message",
                envelope.kind_name()
            );
            return;
        }
        debug!("queueing {} message", envelope.kind_name());
        self.queue(LinkCommand::Send(encode_envelope(&envelope)));
    }

    fn close(&self, reason: &str, code: u16) {
        // Flip the flag here so nothing queued after the close is sent.
        if !self.open.swap(false, Ordering::SeqCst) {
            warn!("close requested but the connection is not open");
            return;
        }
        self.queue(LinkCommand::Close {
            reason: truncate_reason(reason),
            code,
        });
    }
}

/// Cuts `reason` to [`MAX_CLOSE_REASON`] bytes without splitting a character.
pub fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Decodes one binary frame and routes it to the matching core callback.
///
/// Undecodable and empty envelopes are logged and dropped; the session
/// continues.
pub fn dispatch_message(core: &mut AdapterCore, bytes: &[u8]) {
    let envelope = match decode_envelope(bytes) {
        Ok(envelope) => envelope,
        Err(ProtocolError::EmptyEnvelope) => {
            warn!("received an envelope without a message; ignoring");
            return;
        }
        Err(e) => {
            warn!("dropping undecodable frame of {} bytes: {e}", bytes.len());
            return;
        }
    };
    debug!("received {} message", envelope.kind_name());

    let Some(kind) = envelope.kind else {
        return;
    };
    match kind {
        envelope::Kind::Configuration(configuration) => {
            core.on_configuration_received(configuration)
        }
        envelope::Kind::Label(label) => core.on_label_received(label),
        envelope::Kind::Reset(_) => core.on_reset_received(),
        envelope::Kind::Error(err) => core.on_error_received(&err.message),
        envelope::Kind::Ready(_) => warn!("broker sent Ready, which only adapters send; ignoring"),
        envelope::Kind::Announcement(_) => {
            warn!("broker sent an Announcement, which only adapters send; ignoring")
        }
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

/// Owns the broker socket for the lifetime of one session.
pub struct BrokerConnection {
    url: Url,
    token: String,
    accept_invalid_certs: bool,
    commands: mpsc::UnboundedReceiver<LinkCommand>,
    open: Arc<AtomicBool>,
}

impl BrokerConnection {
    /// Creates the connection and the handle to give to the adapter core.
    /// Nothing is opened until the core calls [`BrokerLink::connect`].
    pub fn new(url: Url, config: &BrokerConfig) -> (Self, BrokerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let connection = Self {
            url,
            token: config.token.clone(),
            accept_invalid_certs: config.accept_invalid_certs,
            commands: rx,
            open: Arc::clone(&open),
        };
        (connection, BrokerHandle { commands: tx, open })
    }

    /// Runs the session: connects, then processes broker frames, queued
    /// commands, SUT events, and the shutdown signal until the socket closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket connection cannot be established.
    /// Everything after that is handled inside the session and ends with
    /// `Ok(())`.
    pub async fn run(
        mut self,
        mut core: AdapterCore,
        mut sut_events: mpsc::UnboundedReceiver<SutEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> anyhow::Result<()> {
        // A dropped sender is not a shutdown request; it only disarms the branch.
        let mut shutdown_seen = false;
        core.start();

        // ── Wait for the connect request ──────────────────────────────────────
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(LinkCommand::Connect) => break,
                    Some(other) => warn!("ignoring {other:?} before the connection is open"),
                    None => return Ok(()),
                },
                result = &mut shutdown, if !shutdown_seen => {
                    shutdown_seen = true;
                    if result.is_ok() {
                        info!("shutdown requested before connecting");
                        return Ok(());
                    }
                }
            }
        }

        let socket = self.open_socket().await?;
        info!("connected to broker at {}", self.url);
        self.open.store(true, Ordering::SeqCst);
        core.on_connection_opened();

        let (mut write, mut read) = socket.split();
        let mut sut_open = true;
        let mut closing = false;
        let close_deadline = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(close_deadline);

        // ── Event loop ────────────────────────────────────────────────────────
        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    // Once the session is closing only the close reply matters.
                    Some(Ok(Message::Binary(bytes))) if closing || !self.open.load(Ordering::SeqCst) => {
                        debug!("dropping frame of {} bytes received while closing", bytes.len());
                    }
                    Some(Ok(Message::Binary(bytes))) => dispatch_message(&mut core, &bytes),
                    Some(Ok(Message::Close(frame))) => {
                        self.open.store(false, Ordering::SeqCst);
                        match frame {
                            Some(f) => core.on_connection_closed(Some(u16::from(f.code)), &f.reason),
                            None => core.on_connection_closed(None, ""),
                        }
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        warn!("ignoring text frame of {} bytes; the broker protocol is binary", text.len());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("error receiving from broker: {e}");
                        core.on_transport_error(&e);
                        break;
                    }
                    None => {
                        self.open.store(false, Ordering::SeqCst);
                        core.on_connection_closed(None, "stream ended");
                        break;
                    }
                },

                Some(command) = self.commands.recv() => match command {
                    LinkCommand::Send(bytes) => {
                        if let Err(e) = write.send(Message::Binary(bytes)).await {
                            warn!("failed to send frame to broker: {e}");
                        }
                    }
                    LinkCommand::Close { reason, code } => {
                        info!("closing broker connection ({code}): {reason}");
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        if let Err(e) = write.send(Message::Close(Some(frame))).await {
                            warn!("failed to send close frame: {e}");
                            break;
                        }
                        closing = true;
                        close_deadline.as_mut().reset(Instant::now() + CLOSE_TIMEOUT);
                    }
                    LinkCommand::Connect => debug!("connect requested while already connected"),
                },

                event = sut_events.recv(), if sut_open => match event {
                    Some(SutEvent::Response { label, physical_label, timestamp }) => {
                        core.send_response(label, physical_label, timestamp);
                    }
                    Some(SutEvent::Failure(message)) => core.report_error(&message),
                    None => sut_open = false,
                },

                result = &mut shutdown, if !shutdown_seen => {
                    shutdown_seen = true;
                    if result.is_ok() {
                        info!("shutdown requested");
                        core.report_error("adapter shutting down");
                    }
                }

                _ = &mut close_deadline, if closing => {
                    warn!("broker did not acknowledge the close within {CLOSE_TIMEOUT:?}");
                    core.on_connection_closed(None, "close timed out");
                    break;
                }
            }
        }

        self.open.store(false, Ordering::SeqCst);
        // Flushes a pending close reply; errors only mean the socket is gone.
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, write.close()).await;
        info!("broker session ended in state {}", core.state());
        Ok(())
    }

    async fn open_socket(&self) -> anyhow::Result<BrokerSocket> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .with_context(|| format!("invalid broker url '{}'", self.url))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .context("auth token is not a valid HTTP header value")?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let connector = if self.accept_invalid_certs {
            warn!("TLS certificate validation is disabled");
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .context("failed to build TLS connector")?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        let (socket, response) = connect_async_tls_with_config(request, None, false, connector)
            .await
            .with_context(|| format!("failed to connect to broker at {}", self.url))?;
        debug!("broker handshake completed with status {}", response.status());
        Ok(socket)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
