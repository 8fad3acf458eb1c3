//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Failed to serialize a frame.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize a frame.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Frame carried an opcode this client does not understand.
    #[error("unsupported opcode: {0}")]
    UnsupportedOpcode(u8),

    /// Frame was structurally valid JSON but missing required fields.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The server negotiated an RPC version we do not speak.
    #[error("unsupported rpc version: expected {expected}, got {got}")]
    UnsupportedRpcVersion {
        /// RPC version this client implements.
        expected: u32,
        /// RPC version announced by the server.
        got: u32,
    },
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}
