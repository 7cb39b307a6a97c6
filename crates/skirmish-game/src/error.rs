//! Error types for the game layer.

use skirmish_protocol::PlayerId;

use crate::GameState;

/// Broad classes of [`GameError`], for hosts that map errors to feedback
/// styles rather than matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before anything changed.
    Validation,
    /// The operation isn't valid in the current state.
    StateConflict,
    /// A queue join/leave was refused.
    Admission,
    /// No definition by that name.
    NotFound,
}

/// Errors from registry operations. Every error leaves state unchanged.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("game {0} not found")]
    NotFound(String),

    #[error("a game named {0} already exists")]
    DuplicateName(String),

    #[error("unknown game type {0}")]
    InvalidType(String),

    #[error("invalid value: {0}")]
    Validation(String),

    /// For example `enable` on a game that isn't DISABLED.
    #[error("cannot {operation} game {name} while it is {state}")]
    StateConflict {
        name: String,
        state: GameState,
        operation: &'static str,
    },

    #[error("game {name} is already being edited by {operator}")]
    AlreadyEditing { name: String, operator: PlayerId },

    #[error("{operator} is already editing game {editing}")]
    OperatorBusy { operator: PlayerId, editing: String },

    #[error("{0} is not editing any game")]
    NotEditing(PlayerId),

    #[error("the queue for {0} is disabled")]
    QueueDisabled(String),

    #[error("{player} is already queued for {name}")]
    AlreadyQueued { player: PlayerId, name: String },

    #[error("{player} is already queued or playing in {name}")]
    AlreadyQueuedElsewhere { player: PlayerId, name: String },

    #[error("game {name} is not accepting players while it is {state}")]
    NotJoinable { name: String, state: GameState },

    #[error("game {name} is full ({max_players} players)")]
    QueueFull { name: String, max_players: usize },

    #[error("{0} is not queued for any game")]
    NotQueued(PlayerId),
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DuplicateName(_) | Self::InvalidType(_) | Self::Validation(_) => {
                ErrorKind::Validation
            }
            Self::StateConflict { .. }
            | Self::AlreadyEditing { .. }
            | Self::OperatorBusy { .. }
            | Self::NotEditing(_) => ErrorKind::StateConflict,
            Self::QueueDisabled(_)
            | Self::AlreadyQueued { .. }
            | Self::AlreadyQueuedElsewhere { .. }
            | Self::NotJoinable { .. }
            | Self::QueueFull { .. }
            | Self::NotQueued(_) => ErrorKind::Admission,
        }
    }
}
