//! Protocol error types.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while validating identifiers or encoding/decoding
/// request and response bodies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Room identifier is not of the form `!localpart:server`.
    #[error("invalid room id {value:?}: {reason}")]
    InvalidRoomId {
        /// The rejected input
        value: String,
        /// Which rule the input broke
        reason: &'static str,
    },

    /// Body could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Body could not be deserialized.
    #[error("decode failed: {0}")]
    Decode(String),
}
