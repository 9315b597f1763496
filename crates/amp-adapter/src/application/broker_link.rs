//! Outbound side of the broker connection, as seen by the adapter core.

use amp_core::protocol::{Configuration, Envelope, Label};

/// WebSocket close code for an orderly shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// WebSocket close code used when the session ends because of an error.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Everything the adapter core may ask of the broker transport.
///
/// Implementations only queue work; none of these methods block on the
/// network.  Only [`connect`](BrokerLink::connect),
/// [`send_message`](BrokerLink::send_message) and
/// [`close`](BrokerLink::close) are required, the typed senders wrap their
/// envelope case and forward to `send_message`.
pub trait BrokerLink: Send + Sync {
    /// Requests that the transport be opened.  The result arrives later as
    /// a connection-opened or transport-error callback on the core.
    fn connect(&self);

    /// Queues one envelope as a binary frame.  Dropped with a warning when
    /// the transport is not open.
    fn send_message(&self, envelope: Envelope);

    /// Closes the transport with a WebSocket close code and reason.  A no-op
    /// (with a warning) when the transport is not open.
    fn close(&self, reason: &str, code: u16);

    fn send_announcement(&self, name: &str, labels: Vec<Label>, configuration: Configuration) {
        self.send_message(Envelope::announcement(name, labels, configuration));
    }

    fn send_ready(&self) {
        self.send_message(Envelope::ready());
    }

    /// Echoes a received stimulus back to the broker, carrying its
    /// correlation id.
    fn send_stimulus_confirmation(
        &self,
        label: Label,
        physical_label: Option<String>,
        timestamp: i64,
        correlation_id: i64,
    ) {
        self.send_message(Envelope::label(label.confirmed(
            physical_label,
            timestamp,
            correlation_id,
        )));
    }

    fn send_response(&self, label: Label, physical_label: Option<String>, timestamp: i64) {
        self.send_message(Envelope::label(label.stamped(physical_label, timestamp)));
    }

    fn send_error(&self, message: &str) {
        self.send_message(Envelope::error(message));
    }
}
