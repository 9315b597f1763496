//! Recording broker link for unit testing.
//!
//! # Why a recording link?
//!
//! The real [`BrokerHandle`](super::broker_conn::BrokerHandle) hands frames to
//! a WebSocket task, which makes it awkward to observe what the adapter core
//! decided to send.  `RecordingLink` keeps every call in memory instead, so
//! tests can assert on exactly which envelopes went out and in what order.
//!
//! Unlike the real link it never refuses a send: frames queued after a close
//! are recorded too, which lets tests see everything the core attempted.
//!
//! # Usage in tests
//!
//! ```ignore
//! let link = Arc::new(RecordingLink::new());
//! let mut core = AdapterCore::new("c@n", handler, link.clone(), Default::default());
//!
//! core.report_error("boom");
//!
//! assert_eq!(link.errors(), vec!["boom".to_string()]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use amp_core::protocol::{envelope, Envelope, Label};

use crate::application::broker_link::BrokerLink;

/// A link that records every call without touching the network.
#[derive(Default)]
pub struct RecordingLink {
    connects: AtomicUsize,
    sent: Mutex<Vec<Envelope>>,
    closes: Mutex<Vec<(String, u16)>>,
    history: Mutex<Vec<&'static str>>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `connect` calls so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Removes and returns every envelope sent so far.
    pub fn take_sent(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    /// Messages of the Error envelopes sent so far.
    pub fn errors(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match &e.kind {
                Some(envelope::Kind::Error(err)) => Some(err.message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Labels (confirmations and responses) sent so far.
    pub fn labels(&self) -> Vec<Label> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match &e.kind {
                Some(envelope::Kind::Label(label)) => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every call in order: `"connect"`, the envelope case name for each
    /// send, and `"close"`.
    pub fn history(&self) -> Vec<&'static str> {
        self.history.lock().unwrap().clone()
    }

    /// `(reason, code)` of every `close` call.
    pub fn closes(&self) -> Vec<(String, u16)> {
        self.closes.lock().unwrap().clone()
    }
}

impl BrokerLink for RecordingLink {
    fn connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.history.lock().unwrap().push("connect");
    }

    fn send_message(&self, envelope: Envelope) {
        self.history.lock().unwrap().push(envelope.kind_name());
        self.sent.lock().unwrap().push(envelope);
    }

    fn close(&self, reason: &str, code: u16) {
        self.history.lock().unwrap().push("close");
        self.closes.lock().unwrap().push((reason.to_string(), code));
    }
}
