//! amp-adapter library crate.
//!
//! A plugin adapter connects a system under test (SUT) to the AMP test
//! broker.  The broker drives a model-based test by sending stimuli; the
//! adapter executes them on the SUT and reports what the SUT does back as
//! responses.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! AMP broker (protobuf envelopes over WebSocket)
//!         ↕
//! [amp-adapter]
//!   ├── domain/           AdapterConfig, LogLevel, StimulusFailurePolicy
//!   ├── application/      AdapterCore, BrokerLink and Handler contracts
//!   └── infrastructure/
//!         ├── broker_conn/  WebSocket event loop (tokio-tungstenite)
//!         ├── handler/      WorkerHandler and the loopback SUT
//!         └── config_file/  TOML config loading
//!         ↕
//! System under test
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `amp-core` only; it reaches the
//!   network and the SUT through the `BrokerLink` and `Handler` traits.
//! - `infrastructure` implements those traits with `tokio`, `tungstenite`,
//!   and `crossbeam-channel`.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: session orchestration.
pub mod application;

/// Infrastructure layer: broker connection, handlers, config file.
pub mod infrastructure;
