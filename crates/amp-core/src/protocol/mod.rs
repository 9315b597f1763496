//! Protocol module containing the envelope types, the envelope codec, and the
//! typed value codec.

pub mod codec;
pub mod messages;
pub mod value;

pub use codec::{decode_envelope, encode_envelope, now_ns, ProtocolError};
pub use messages::*;
pub use value::{decode, encode, encode_json, Value, ValueType};
