//! Envelope codec for the AMP broker protocol.
//!
//! Wire format: every WebSocket binary frame carries exactly one
//! protobuf-encoded [`Envelope`].  There is no additional header or length
//! prefix; the frame boundary is the message boundary.

use std::time::{SystemTime, UNIX_EPOCH};

use prost::Message;
use thiserror::Error;

use crate::protocol::messages::Envelope;

/// Errors that can occur while decoding an inbound frame.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The frame is not a valid protobuf `Envelope`.
    #[error("malformed envelope: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The frame decoded, but none of the envelope cases is populated.
    #[error("envelope has no populated message case")]
    EmptyEnvelope,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an [`Envelope`] into the bytes of one binary frame.
///
/// Encoding into a growable buffer cannot fail, so this returns the bytes
/// directly.
///
/// # Examples
///
/// ```rust
/// use amp_core::protocol::{decode_envelope, encode_envelope, Envelope};
///
/// let bytes = encode_envelope(&Envelope::ready());
/// assert_eq!(decode_envelope(&bytes).unwrap(), Envelope::ready());
/// ```
pub fn encode_envelope(envelope: &Envelope) -> Vec<u8> {
    envelope.encode_to_vec()
}

/// Decodes one [`Envelope`] from a complete binary frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] if the bytes are not a valid envelope and
/// [`ProtocolError::EmptyEnvelope`] if no case is populated.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    let envelope = Envelope::decode(bytes)?;
    if envelope.kind.is_none() {
        return Err(ProtocolError::EmptyEnvelope);
    }
    Ok(envelope)
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
///
/// Used for label timestamps.  A clock set before 1970 yields 0.
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
