//! Core value types shared by every Skirmish crate.
//!
//! These are the small, serializable building blocks that the registry,
//! the provisioner contract, and the host gateway all speak: who a player
//! is, where something stands, and what a player is told.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player (or an operator; operators are players
/// with extra permissions, which the host checks before calling in).
///
/// Newtype wrapper so a player id can't be confused with a slot index or a
/// tick count. `#[serde(transparent)]` serializes `PlayerId(42)` as `42`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A point with orientation.
///
/// Spawn points are expressed in the coordinates of the map template; the
/// same coordinates are valid inside every environment cloned from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
}

impl Location {
    /// A location facing the default direction.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    /// Returns a copy with the given orientation.
    pub fn facing(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    /// Returns a copy moved to height `y`, keeping x/z and orientation.
    pub fn with_y(mut self, y: f64) -> Self {
        self.y = y;
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.1}, {:.1}, {:.1} yaw {:.0} pitch {:.0})",
            self.x, self.y, self.z, self.yaw, self.pitch
        )
    }
}

/// Where a relocation request sends a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Destination {
    /// The lobby point, which lives in the host's main world.
    Lobby { location: Location },
    /// A point inside a provisioned session environment.
    Environment { world: String, location: Location },
    /// The host's default spawn in its main world. Used to send players
    /// home when a game has no lobby point.
    WorldSpawn,
}

impl Destination {
    /// The explicit location, if the destination has one.
    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Lobby { location } | Self::Environment { location, .. } => Some(*location),
            Self::WorldSpawn => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Notice: what the orchestrator tells players
// ---------------------------------------------------------------------------

/// A status message delivered to one or more players.
///
/// The host decides how to render these (chat line, title, action bar);
/// `Display` gives the plain-text form used for feedback.
///
/// `#[serde(tag = "type")]` produces `{ "type": "QueueJoined", ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notice {
    QueueJoined {
        game: String,
        queued: usize,
        needed: usize,
    },
    QueueLeft {
        game: String,
    },
    CountdownStarted {
        game: String,
        /// `None` when an operator has to confirm the start.
        seconds: Option<u32>,
    },
    CountdownCancelled {
        game: String,
    },
    Preparing {
        game: String,
        seconds_left: u32,
    },
    GameStarted {
        game: String,
    },
    WaveStarted {
        game: String,
        wave: u32,
    },
    PlayerOut {
        game: String,
        player: PlayerId,
        remaining: usize,
    },
    Winner {
        game: String,
        player: PlayerId,
    },
    GameEnded {
        game: String,
    },
    GameStopped {
        game: String,
    },
    ProvisionFailed {
        game: String,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueJoined {
                game,
                queued,
                needed,
            } => write!(f, "joined the queue for {game} ({queued}/{needed})"),
            Self::QueueLeft { game } => write!(f, "left the queue for {game}"),
            Self::CountdownStarted {
                game,
                seconds: Some(s),
            } => write!(f, "{game} starts in {s} seconds"),
            Self::CountdownStarted {
                game,
                seconds: None,
            } => write!(f, "{game} is ready, waiting for an operator to start"),
            Self::CountdownCancelled { game } => {
                write!(f, "{game} countdown cancelled, waiting for players")
            }
            Self::Preparing { game, seconds_left } => {
                write!(f, "{game} begins in {seconds_left}")
            }
            Self::GameStarted { game } => write!(f, "{game} has started"),
            Self::WaveStarted { game, wave } => write!(f, "{game}: wave {wave}"),
            Self::PlayerOut {
                game,
                player,
                remaining,
            } => write!(f, "{game}: {player} is out, {remaining} remaining"),
            Self::Winner { game, player } => write!(f, "{game}: {player} wins"),
            Self::GameEnded { game } => write!(f, "{game} has ended"),
            Self::GameStopped { game } => write!(f, "{game} was stopped by an operator"),
            Self::ProvisionFailed { game } => {
                write!(f, "{game} could not be set up, the queue was cleared")
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
