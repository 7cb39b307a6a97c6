//! Session environments: the disposable map copies a running game lives in.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use skirmish_protocol::{Location, PlayerId};

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Identifier of one activation of a game definition.
///
/// A fresh id is generated every time a definition enters preparation, so
/// two runs of the same game never share an environment name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a random 8-character lowercase hex id (32 bits).
    ///
    /// Collisions only matter between environments alive at the same time,
    /// which is a handful per server.
    pub fn generate() -> Self {
        let bytes: [u8; 4] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The name of the environment provisioned for `session_id` from
/// `map_template`: `<mapTemplate>-<sessionId>`.
pub fn environment_name(map_template: &str, session_id: &SessionId) -> String {
    format!("{map_template}-{session_id}")
}

// ---------------------------------------------------------------------------
// SessionEnvironment
// ---------------------------------------------------------------------------

/// A provisioned, isolated copy of a map template.
///
/// Returned by [`Provisioner::provision`](crate::Provisioner::provision).
/// The orchestrator only reads from it; destruction goes back through the
/// provisioner by name.
pub trait SessionEnvironment: Send + Sync + fmt::Debug {
    /// World name players are relocated into.
    fn name(&self) -> &str;

    /// Where the host spawns players by default in this world.
    fn default_spawn_point(&self) -> Location;

    /// Height of the highest solid block at the given column.
    fn ground_level_at(&self, x: f64, z: f64) -> f64;
}

/// A flat environment with a fixed spawn point and a constant ground level.
///
/// Good enough for hosts whose arenas are flat and for tests.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticEnvironment {
    pub name: String,
    pub spawn: Location,
    pub ground_level: f64,
}

impl StaticEnvironment {
    /// A flat environment named after the template/session pair, spawning
    /// at `(0, ground_level, 0)`.
    pub fn flat(map_template: &str, session_id: &SessionId, ground_level: f64) -> Self {
        Self {
            name: environment_name(map_template, session_id),
            spawn: Location::new(0.0, ground_level, 0.0),
            ground_level,
        }
    }
}

impl SessionEnvironment for StaticEnvironment {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_spawn_point(&self) -> Location {
        self.spawn
    }

    fn ground_level_at(&self, _x: f64, _z: f64) -> f64 {
        self.ground_level
    }
}

// ---------------------------------------------------------------------------
// ActiveSession
// ---------------------------------------------------------------------------

/// One running activation of a game definition.
///
/// Participants are fixed when the session is created and never change;
/// `present` is the subset still in the game. The environment arrives
/// asynchronously, after the provisioner answers.
#[derive(Debug)]
pub struct ActiveSession {
    id: SessionId,
    map_template: String,
    environment: Option<Arc<dyn SessionEnvironment>>,
    participants: Vec<PlayerId>,
    present: BTreeSet<PlayerId>,
}

impl ActiveSession {
    pub fn new(map_template: impl Into<String>, participants: Vec<PlayerId>) -> Self {
        Self::with_id(SessionId::generate(), map_template, participants)
    }

    pub fn with_id(
        id: SessionId,
        map_template: impl Into<String>,
        participants: Vec<PlayerId>,
    ) -> Self {
        let present = participants.iter().copied().collect();
        Self {
            id,
            map_template: map_template.into(),
            environment: None,
            participants,
            present,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn map_template(&self) -> &str {
        &self.map_template
    }

    /// `<mapTemplate>-<sessionId>`, known before provisioning finishes.
    pub fn environment_name(&self) -> String {
        environment_name(&self.map_template, &self.id)
    }

    pub fn environment(&self) -> Option<&Arc<dyn SessionEnvironment>> {
        self.environment.as_ref()
    }

    pub fn is_provisioned(&self) -> bool {
        self.environment.is_some()
    }

    /// Attaches the provisioned environment. Returns the previous one if
    /// the provisioner answered twice.
    pub fn attach(
        &mut self,
        environment: Arc<dyn SessionEnvironment>,
    ) -> Option<Arc<dyn SessionEnvironment>> {
        self.environment.replace(environment)
    }

    /// Everyone admitted when the session was created, in queue order.
    pub fn participants(&self) -> &[PlayerId] {
        &self.participants
    }

    /// Participants still in the game, in id order.
    pub fn present(&self) -> Vec<PlayerId> {
        self.present.iter().copied().collect()
    }

    pub fn present_count(&self) -> usize {
        self.present.len()
    }

    pub fn is_present(&self, player: PlayerId) -> bool {
        self.present.contains(&player)
    }

    /// Marks a participant as gone. Returns `false` if they weren't present.
    pub fn remove(&mut self, player: PlayerId) -> bool {
        self.present.remove(&player)
    }

    /// Consumes the session into the pair needed to destroy its environment.
    pub fn into_teardown(self) -> crate::Teardown {
        crate::Teardown {
            map_template: self.map_template,
            session_id: self.id,
        }
    }
}
