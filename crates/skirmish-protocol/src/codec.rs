//! Codec trait and implementations for persisted records.
//!
//! A codec turns serde types into bytes and back. The store layer doesn't
//! care which format is used, only that something implements [`Codec`].
//! [`JsonCodec`] is the default: human-readable files an operator can fix
//! by hand if needed.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes serde types to bytes and decodes them back.
///
/// `Send + Sync + 'static` so a store can hold one inside a spawned task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`, pretty-printed so stored definition
/// files diff cleanly.
///
/// Behind the `json` feature flag (enabled by default).
///
/// ```rust
/// use skirmish_protocol::{Codec, JsonCodec, Location};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&Location::new(1.0, 64.0, 2.0)).unwrap();
/// let back: Location = codec.decode(&bytes).unwrap();
/// assert_eq!(back.y, 64.0);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec_pretty(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
