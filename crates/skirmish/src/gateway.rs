//! How the orchestrator reaches players.

use skirmish_protocol::{Destination, Notice, PlayerId};
use tokio::sync::mpsc;

/// The host side of player interaction.
///
/// Called from the orchestrator task, so implementations must not block:
/// a host with its own main thread queues the request there and returns.
pub trait PlayerGateway: Send + Sync + 'static {
    fn relocate(&self, player: PlayerId, destination: &Destination);

    /// Freezes (`true`) or releases (`false`) the player's movement.
    fn set_movement_locked(&self, player: PlayerId, locked: bool);

    fn notify(&self, player: PlayerId, notice: &Notice);
}

/// One gateway call, as delivered by [`ChannelGateway`].
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Relocate {
        player: PlayerId,
        destination: Destination,
    },
    MovementLocked {
        player: PlayerId,
        locked: bool,
    },
    Notice {
        player: PlayerId,
        notice: Notice,
    },
}

impl GatewayEvent {
    pub fn player(&self) -> PlayerId {
        match self {
            Self::Relocate { player, .. }
            | Self::MovementLocked { player, .. }
            | Self::Notice { player, .. } => *player,
        }
    }
}

/// A [`PlayerGateway`] that forwards every call into an unbounded channel.
///
/// Useful when the host loop lives elsewhere (it drains the receiver on
/// its own schedule) and in tests. Sends to a dropped receiver are
/// silently discarded.
#[derive(Debug, Clone)]
pub struct ChannelGateway {
    sender: mpsc::UnboundedSender<GatewayEvent>,
}

impl ChannelGateway {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: GatewayEvent) {
        let _ = self.sender.send(event);
    }
}

impl PlayerGateway for ChannelGateway {
    fn relocate(&self, player: PlayerId, destination: &Destination) {
        self.send(GatewayEvent::Relocate {
            player,
            destination: destination.clone(),
        });
    }

    fn set_movement_locked(&self, player: PlayerId, locked: bool) {
        self.send(GatewayEvent::MovementLocked { player, locked });
    }

    fn notify(&self, player: PlayerId, notice: &Notice) {
        self.send(GatewayEvent::Notice {
            player,
            notice: notice.clone(),
        });
    }
}
