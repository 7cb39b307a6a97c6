//! Side-effect requests emitted by the registry.
//!
//! The registry never performs I/O. Each operation appends `Effect`s to an
//! outbox, and whoever owns the registry (the orchestrator actor) executes
//! them: persistence and provisioning in spawned tasks, relocation and
//! notices through the host gateway.

use skirmish_protocol::{Destination, Notice, PlayerId};
use skirmish_session::{SessionId, Teardown};

use crate::DefinitionRecord;

#[derive(Debug, Clone)]
pub enum Effect {
    /// Save the committed definition.
    Persist(DefinitionRecord),
    /// Create the environment for a session that just entered PREPARING.
    /// The result must be fed back through
    /// [`GameRegistry::on_provisioned`](crate::GameRegistry::on_provisioned).
    Provision {
        game: String,
        map_template: String,
        session_id: SessionId,
    },
    /// Destroy an environment. Only ever emitted from `tick`, one tick
    /// after the session that owned it ended.
    Destroy(Teardown),
    Relocate {
        player: PlayerId,
        destination: Destination,
    },
    /// Freeze (`true`) or release (`false`) a player's movement.
    LockMovement { player: PlayerId, locked: bool },
    Notify { player: PlayerId, notice: Notice },
}

/// Pushes the same notice to every player in `players`.
pub(crate) fn notify_all(effects: &mut Vec<Effect>, players: &[PlayerId], notice: Notice) {
    for &player in players {
        effects.push(Effect::Notify {
            player,
            notice: notice.clone(),
        });
    }
}
