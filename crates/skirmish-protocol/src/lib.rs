//! Shared value types for Skirmish.
//!
//! - **Types** ([`PlayerId`], [`Location`], [`Destination`], [`Notice`]):
//!   identities, positions, and player-facing status messages.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how persisted records are
//!   turned into bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! This crate knows nothing about games, timers, or environments; every
//! other crate depends on it.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{Destination, Location, Notice, PlayerId};
