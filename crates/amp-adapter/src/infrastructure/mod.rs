//! Infrastructure layer for amp-adapter.
//!
//! Everything that touches the outside world lives here: the WebSocket
//! connection to the broker, the handler worker threads, and reading the
//! config file.
//!
//! # What does NOT belong here?
//!
//! - Session rules and state transitions (that is the application layer)
//! - Configuration types (that is the domain layer)

pub mod broker_conn;
pub mod config_file;
pub mod handler;
pub mod mock;

pub use broker_conn::{dispatch_message, BrokerConnection, BrokerHandle};
pub use config_file::load_config;
