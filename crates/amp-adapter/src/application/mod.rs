//! Application layer for amp-adapter.
//!
//! The application layer knows *what* to do with each broker event; it
//! delegates *how* to talk to the broker and the SUT to the traits defined
//! here, which the infrastructure layer implements.
//!
//! - [`adapter_core`]: the session orchestrator.
//! - [`broker_link`]: what the core may ask of the broker transport.
//! - [`handler`]: what the core may ask of the SUT, plus the response sink.

pub mod adapter_core;
pub mod broker_link;
pub mod handler;

pub use adapter_core::AdapterCore;
pub use broker_link::{BrokerLink, CLOSE_INTERNAL_ERROR, CLOSE_NORMAL};
pub use handler::{Handler, HandlerError, ResponseSink, SutEvent};
