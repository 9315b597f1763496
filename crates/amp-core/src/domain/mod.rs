//! Domain entities for the AMP plugin adapter.
//!
//! This module contains pure session logic with no infrastructure
//! dependencies: no sockets, no async runtime, no SUT drivers.
//!
//! # Why keep the state machine here? (for beginners)
//!
//! The broker protocol is a strict handshake.  Every inbound message is only
//! legal in one phase of the session, so the phase rules are the core business
//! rule of the adapter.  Keeping them in a plain struct means they can be unit
//! tested exhaustively without a broker, and the outer layers (the adapter
//! core and the broker connection) can only change the phase through the
//! checked [`state::StateMachine::transition`] call.

/// Session phase tracking.
///
/// See [`state::StateMachine`] for the main type.
pub mod state;
