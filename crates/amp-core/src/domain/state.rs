//! Session state machine.
//!
//! ```text
//! Disconnected ──► Connected ──► Announced ──► Configured ──► Ready ◄─┐
//!                                                               │     │
//!                                                               └─────┘ (reset)
//!
//!            any state ──► Error   (terminal)
//! ```
//!
//! Transitions only move forward; none may be skipped.  `Ready → Ready` is the
//! reset cycle.  `Error` is reachable from every state, including itself, and
//! nothing leaves it.

use std::fmt;

use thiserror::Error;

/// Phase of the broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No transport yet, or a connect is still pending.
    #[default]
    Disconnected,
    /// Transport open; the announcement has not been sent.
    Connected,
    /// Announcement sent; waiting for the broker's configuration.
    Announced,
    /// Configuration accepted; the handler is starting.
    Configured,
    /// Handler started; stimuli and resets are accepted.
    Ready,
    /// The broker reported an error.  Terminal.
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connected => "CONNECTED",
            Self::Announced => "ANNOUNCED",
            Self::Configured => "CONFIGURED",
            Self::Ready => "READY",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Returned when a transition is not in the legal set.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("illegal session transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Holds the current [`SessionState`] and enforces the legal transitions.
#[derive(Debug, Default)]
pub struct StateMachine {
    current: SessionState,
}

impl StateMachine {
    /// Creates a machine in [`SessionState::Disconnected`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> SessionState {
        self.current
    }

    /// Returns `true` if `from → to` is a legal transition.
    pub fn is_legal(from: SessionState, to: SessionState) -> bool {
        use SessionState::*;
        match (from, to) {
            (_, Error) => true,
            (Error, _) => false,
            (Disconnected, Connected)
            | (Connected, Announced)
            | (Announced, Configured)
            | (Configured, Ready)
            | (Ready, Ready) => true,
            _ => false,
        }
    }

    /// Moves to `to`, or leaves the state untouched and returns an error.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] for any transition not shown in the
    /// module-level diagram.
    pub fn transition(&mut self, to: SessionState) -> Result<(), InvalidTransition> {
        if !Self::is_legal(self.current, to) {
            return Err(InvalidTransition {
                from: self.current,
                to,
            });
        }
        self.current = to;
        Ok(())
    }
}
