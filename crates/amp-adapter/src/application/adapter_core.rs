//! AdapterCore: session orchestration between the broker and the handler.
//!
//! The core receives one callback per broker event, checks it against the
//! [`StateMachine`], calls into the [`Handler`], and tells the
//! [`BrokerLink`] what to send back.  It is owned by the broker event loop
//! and only ever touched from that task, so it needs no locking.
//!
//! # Session lifecycle
//!
//! ```text
//! start()                     → link.connect()
//! on_connection_opened()      → Announcement            (Connected → Announced)
//! on_configuration_received() → handler.start(), Ready  (Announced → Ready)
//! on_label_received()         → handler.stimulate(), confirmation
//! on_reset_received()         → handler.reset(), Ready  (Ready → Ready)
//! on_error_received()         → close                   (any → Error)
//! ```
//!
//! Anything arriving out of order is a protocol violation and ends the
//! session through [`AdapterCore::report_error`].

use std::fmt;
use std::sync::Arc;

use amp_core::protocol::{now_ns, Configuration, Label};
use amp_core::{SessionState, StateMachine};
use tracing::{debug, error, info, warn};

use crate::application::broker_link::{BrokerLink, CLOSE_INTERNAL_ERROR};
use crate::application::handler::Handler;
use crate::domain::StimulusFailurePolicy;

pub struct AdapterCore {
    name: String,
    state: StateMachine,
    handler: Arc<dyn Handler>,
    link: Arc<dyn BrokerLink>,
    connect_requested: bool,
    stimulus_failure: StimulusFailurePolicy,
}

impl AdapterCore {
    /// Creates a disconnected core.  `name` is the session name announced to
    /// the broker (`<channel>@<name>`).
    pub fn new(
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
        link: Arc<dyn BrokerLink>,
        stimulus_failure: StimulusFailurePolicy,
    ) -> Self {
        Self {
            name: name.into(),
            state: StateMachine::new(),
            handler,
            link,
            connect_requested: false,
            stimulus_failure,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Asks the link to connect.  Only the first call while disconnected has
    /// any effect.
    pub fn start(&mut self) {
        if self.state() == SessionState::Disconnected && !self.connect_requested {
            info!("connecting to broker as '{}'", self.name);
            self.connect_requested = true;
            self.link.connect();
        } else {
            info!("connection started while already connected");
        }
    }

    /// Sends the announcement once the transport is open.
    pub fn on_connection_opened(&mut self) {
        if self.state() != SessionState::Disconnected {
            info!("connection opened while already connected");
            return;
        }
        if !self.advance(SessionState::Connected) {
            return;
        }

        let labels = self.handler.supported_labels();
        info!("announcing {} label(s)", labels.len());
        self.link
            .send_announcement(&self.name, labels, self.handler.configuration());

        self.advance(SessionState::Announced);
    }

    /// Starts the handler and reports Ready.
    pub fn on_configuration_received(&mut self, configuration: Configuration) {
        match self.state() {
            SessionState::Announced => {}
            SessionState::Connected => {
                return self.report_error("Configuration received while not yet announced")
            }
            _ => return self.report_error("Configuration received while already configured"),
        }

        info!(
            "configuration received ({} item(s))",
            configuration.items.len()
        );
        if !self.advance(SessionState::Configured) {
            return;
        }

        info!("starting the SUT");
        if let Err(e) = self.handler.start() {
            error!("error connecting to the SUT: {e}");
            return self.report_error(&e.to_string());
        }

        debug!("sending ready");
        self.link.send_ready();
        self.advance(SessionState::Ready);
    }

    /// Executes a stimulus and confirms it to the broker.
    pub fn on_label_received(&mut self, label: Label) {
        if self.state() != SessionState::Ready {
            return self.report_error("Label received while not ready");
        }
        if !label.is_stimulus() {
            self.report_error("Label is not a stimulus");
        }

        let correlation_id = label.correlation_id();
        debug!("stimulating label '{}' (correlation {correlation_id})", label.name);

        let physical_label = match self.handler.stimulate(&label) {
            Ok(physical) => physical,
            Err(e) => match self.stimulus_failure {
                StimulusFailurePolicy::Confirm => {
                    error!("stimulus '{}' failed: {e}", label.name);
                    None
                }
                StimulusFailurePolicy::Abort => {
                    return self.report_error(&format!("error while stimulating the SUT: {e}"));
                }
            },
        };

        debug!("confirming stimulus label '{}'", label.name);
        self.link
            .send_stimulus_confirmation(label, physical_label, now_ns(), correlation_id);
    }

    /// Resets the handler and reports Ready again.
    pub fn on_reset_received(&mut self) {
        match self.state() {
            SessionState::Ready => {}
            SessionState::Connected => {
                return self.report_error("Reset received but there is a connection error")
            }
            _ => return self.report_error("Reset received while not ready"),
        }

        info!("reset received; resetting the SUT");
        if let Err(e) = self.handler.reset() {
            error!("error resetting the SUT: {e}");
            return self.report_error(&e.to_string());
        }

        debug!("sending ready");
        self.link.send_ready();
        self.advance(SessionState::Ready);
    }

    /// The broker gave up on the session.  Nothing is sent back.
    pub fn on_error_received(&mut self, message: &str) {
        self.advance(SessionState::Error);
        let reason = format!("Error message received: {message}");
        error!("{reason}");
        self.handler.stop();
        self.link.close(&reason, CLOSE_INTERNAL_ERROR);
    }

    /// Forwards a response observed on the SUT.
    pub fn send_response(
        &mut self,
        label: Label,
        physical_label: Option<String>,
        timestamp: Option<i64>,
    ) {
        if !label.is_response() {
            error!("label '{}' is not a response", label.name);
            return self.report_error("Response label is not of type response");
        }
        let timestamp = timestamp.unwrap_or_else(now_ns);
        self.link.send_response(label, physical_label, timestamp);
    }

    /// Ends the session: stops the handler, sends an Error envelope, and
    /// closes the transport.  The state is left untouched.
    pub fn report_error(&mut self, message: &str) {
        error!("{message}");
        self.handler.stop();
        self.link.send_error(message);
        self.link.close(message, CLOSE_INTERNAL_ERROR);
    }

    /// The transport closed, by either side.
    pub fn on_connection_closed(&mut self, code: Option<u16>, reason: &str) {
        match code {
            Some(code) => info!("connection closed with code {code}: {reason}"),
            None => info!("connection closed"),
        }
        self.handler.stop();
    }

    /// The transport failed while open.
    pub fn on_transport_error(&mut self, err: &dyn fmt::Display) {
        warn!("transport error: {err}");
        self.report_error(&format!("connection error: {err}"));
    }

    fn advance(&mut self, to: SessionState) -> bool {
        match self.state.transition(to) {
            Ok(()) => {
                debug!("session state is now {to}");
                true
            }
            Err(e) => {
                error!("{e}");
                false
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
