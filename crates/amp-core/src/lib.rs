//! # amp-core
//!
//! Shared library for the AMP plugin adapter containing the broker envelope
//! protocol, the typed value codec, and the session state machine.
//!
//! This crate has no dependencies on sockets, async runtimes, or SUT drivers.
//!
//! # Architecture overview
//!
//! A plugin adapter sits between the AMP test broker and a system under test
//! (SUT).  The broker sends *stimuli* (actions to perform on the SUT) and
//! expects *responses* (events observed on the SUT) in return.  Every message
//! travels inside one protobuf [`Envelope`].
//!
//! - **`protocol`** – The wire types (`Envelope`, `Label`, `TypedValue`, …),
//!   envelope encoding/decoding, and the recursive codec that converts between
//!   wire [`TypedValue`]s and native [`Value`]s.
//!
//! - **`domain`** – Pure session logic.  The [`StateMachine`] tracks the
//!   handshake phase (Disconnected → Connected → Announced → Configured →
//!   Ready) and rejects skipped or backwards transitions.

pub mod domain;
pub mod protocol;

pub use domain::state::{InvalidTransition, SessionState, StateMachine};
pub use protocol::codec::{decode_envelope, encode_envelope, now_ns, ProtocolError};
pub use protocol::messages::{Envelope, Label, LabelType, TypedValue};
pub use protocol::value::{Value, ValueType};
