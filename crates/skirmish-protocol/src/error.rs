//! Error types for the protocol layer.
//!
//! Each crate in Skirmish defines its own error enum, so a `ProtocolError`
//! always means "bytes didn't match the shape", never a game-rule problem.

/// Errors produced while encoding or decoding records.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed input, missing fields, or wrong
    /// types.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The data decoded but violates a record rule (for example a spawn
    /// slot numbered 0).
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}
