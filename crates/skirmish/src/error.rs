//! Unified error type for Skirmish.

use skirmish_game::GameError;

use crate::StoreError;

/// Error returned by every handle method.
///
/// Provisioning failures never surface here: they reach players as
/// notices and the game returns to READY. The `#[from]` attributes let `?`
/// convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum SkirmishError {
    /// A registry operation was rejected. Nothing changed.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Loading or saving definitions failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The orchestrator task has stopped.
    #[error("orchestrator is not running")]
    Unavailable,
}

impl SkirmishError {
    /// The wrapped [`GameError`], if this is a rejected operation.
    pub fn as_game(&self) -> Option<&GameError> {
        match self {
            Self::Game(err) => Some(err),
            _ => None,
        }
    }
}
