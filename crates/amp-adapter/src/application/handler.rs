//! The contract between the adapter core and a system under test.
//!
//! A [`Handler`] knows which labels its SUT supports, how to bring the SUT up
//! and down, and how to execute a stimulus.  Responses observed on the SUT are
//! pushed asynchronously through the [`ResponseSink`] the handler was built
//! with; the broker connection drains the sink on its event loop so that all
//! session state stays on one task.

use amp_core::protocol::{Configuration, Label};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

/// Error type for handler operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HandlerError {
    /// No action is registered for the label name.
    #[error("label '{0}' is not supported by this handler")]
    UnsupportedLabel(String),
    /// The SUT was asked to act while stopped.
    #[error("handler is not running")]
    NotRunning,
    /// Failure reported by the SUT itself.
    #[error("{0}")]
    Sut(String),
}

/// SUT-specific part of the adapter.
///
/// All methods are called from the broker event loop and must return
/// promptly.  Long-running SUT work belongs on the handler's own threads.
#[cfg_attr(test, mockall::automock)]
pub trait Handler: Send + Sync {
    /// Every stimulus and response label the SUT supports, announced to the
    /// broker once the connection opens.
    fn supported_labels(&self) -> Vec<Label>;

    /// Configuration keys announced alongside the labels.
    fn configuration(&self) -> Configuration {
        Configuration::default()
    }

    /// Brings the SUT up after the broker's configuration arrived.
    fn start(&self) -> Result<(), HandlerError>;

    /// Shuts the SUT down and joins any worker threads.  Idempotent.
    fn stop(&self);

    /// Returns the SUT to its initial state.
    fn reset(&self) -> Result<(), HandlerError>;

    /// Queues a stimulus for execution and returns its physical label, if
    /// the handler can name one up front.  Must not block on the SUT.
    fn stimulate(&self, label: &Label) -> Result<Option<String>, HandlerError>;
}

// ── Response sink ─────────────────────────────────────────────────────────────

/// Something the SUT side wants the adapter core to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum SutEvent {
    /// A response label observed on the SUT.
    Response {
        label: Label,
        physical_label: Option<String>,
        /// Nanoseconds since the Unix epoch; `None` means "when sent".
        timestamp: Option<i64>,
    },
    /// A failure that must end the session.
    Failure(String),
}

/// Sending half of the channel from handler threads to the broker event loop.
///
/// Cloneable and usable from any thread.  Once the event loop has exited,
/// events are logged and dropped.
#[derive(Debug, Clone)]
pub struct ResponseSink {
    tx: mpsc::UnboundedSender<SutEvent>,
}

impl ResponseSink {
    /// Creates the sink and the receiver the event loop drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SutEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emits a response label.
    pub fn send_response(&self, label: Label, physical_label: Option<String>, timestamp: Option<i64>) {
        self.emit(SutEvent::Response {
            label,
            physical_label,
            timestamp,
        });
    }

    /// Reports a failure; the adapter core answers with an Error to the
    /// broker and closes the session.
    pub fn report_failure(&self, message: impl Into<String>) {
        self.emit(SutEvent::Failure(message.into()));
    }

    fn emit(&self, event: SutEvent) {
        if self.tx.send(event).is_err() {
            warn!("broker event loop has stopped; dropping SUT event");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
