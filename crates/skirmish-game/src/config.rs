//! Lifecycle state machine and registry configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// The lifecycle state of a game definition.
///
/// ```text
///            enable        first join       threshold met
/// DISABLED ────────→ READY ─────────→ QUEUE ────────────→ COUNTDOWN
///    ↑                 ↑  ←─────────── │  ←──────────────── │
///    │                 │  queue empty  │  below threshold   │ timer / start
///    │                 │               │                    ↓
///    │                 │ ←────────────────────────────── PREPARING
///    │                 │        provisioning failed         │ countdown done
///    │                 │                                    ↓
///    │                 └──────────── FINAL ←──────────── STARTED
///    │                    next tick        variant ended    │
///    └──────────────── stop (from QUEUE, COUNTDOWN, STARTED, FINAL)
/// ```
///
/// - **Disabled**: inert. Initial state and the target of `stop`.
/// - **Ready**: accepting queue joins, nobody queued.
/// - **Queue**: at least one player queued, below the admission threshold.
/// - **Countdown**: threshold met. Dropping below it goes back to Queue.
/// - **Preparing**: participants fixed and held at the lobby while the
///   session environment is provisioned.
/// - **Started**: participants are in the environment, the variant plays.
/// - **Final**: the variant ended the game; back to Ready on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameState {
    Disabled,
    Ready,
    Queue,
    Countdown,
    Preparing,
    Started,
    Final,
}

impl GameState {
    /// Returns `true` if moving from `self` to `target` is a legal
    /// transition. Every state lists its successors explicitly.
    pub fn can_transition_to(self, target: Self) -> bool {
        use GameState::*;
        match self {
            Disabled => matches!(target, Ready),
            Ready => matches!(target, Queue),
            Queue => matches!(target, Ready | Countdown | Disabled),
            Countdown => matches!(target, Queue | Preparing | Disabled),
            Preparing => matches!(target, Started | Ready),
            Started => matches!(target, Final | Disabled),
            Final => matches!(target, Ready | Disabled),
        }
    }

    /// Returns `true` if new players may join the queue in this state.
    pub fn accepts_joins(self) -> bool {
        matches!(self, Self::Ready | Self::Queue | Self::Countdown)
    }

    /// Returns `true` if an operator `stop` is allowed.
    pub fn can_stop(self) -> bool {
        self.can_transition_to(Self::Disabled)
    }

    /// Returns `true` for states that only exist while the process runs.
    /// They are loaded back as Ready.
    pub fn is_transient(self) -> bool {
        !matches!(self, Self::Disabled | Self::Ready)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disabled => "DISABLED",
            Self::Ready => "READY",
            Self::Queue => "QUEUE",
            Self::Countdown => "COUNTDOWN",
            Self::Preparing => "PREPARING",
            Self::Started => "STARTED",
            Self::Final => "FINAL",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// AdmissionPolicy
// ---------------------------------------------------------------------------

/// What happens once a queue reaches its admission threshold.
///
/// Under both policies the definition enters COUNTDOWN the moment
/// `inQueue >= minPlayers`, and a player leaving below the threshold
/// cancels it. They differ only in who ends the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Arm a timer of `countdown_ticks`; when it fires the game starts
    /// preparing, as if an operator had called `start`.
    #[default]
    Immediate,
    /// Arm nothing; the game waits in COUNTDOWN for an operator `start`.
    OperatorConfirmed,
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Seconds-left values at which the preparation countdown is announced.
pub const PREPARATION_CHECKPOINTS: [u32; 8] = [60, 30, 10, 5, 4, 3, 2, 1];

/// Timing and admission settings for a [`GameRegistry`](crate::GameRegistry).
///
/// All durations are in scheduler ticks; at the default 1 Hz a tick is a
/// second.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Length of the COUNTDOWN phase under [`AdmissionPolicy::Immediate`].
    pub countdown_ticks: u32,
    /// Length of the PREPARING phase.
    pub preparation_ticks: u32,
    pub admission_policy: AdmissionPolicy,
    /// Scheduler rate, used to turn tick counts back into the seconds
    /// players are shown.
    pub ticks_per_second: u32,
    /// How long a game may wait for its environment once preparation has
    /// run out before the session is abandoned.
    pub provision_timeout_ticks: u32,
}

impl RegistryConfig {
    /// Whole seconds covered by `ticks`, rounded up.
    pub fn seconds(&self, ticks: u32) -> u32 {
        ticks.div_ceil(self.ticks_per_second.max(1))
    }

    /// The seconds-left value to announce when `remaining` preparation
    /// ticks are left, if that moment is a checkpoint.
    pub fn preparation_checkpoint(&self, remaining: u32) -> Option<u32> {
        let rate = self.ticks_per_second.max(1);
        let seconds = remaining / rate;
        (remaining % rate == 0 && PREPARATION_CHECKPOINTS.contains(&seconds)).then_some(seconds)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            countdown_ticks: 30,
            preparation_ticks: 60,
            admission_policy: AdmissionPolicy::default(),
            ticks_per_second: 1,
            provision_timeout_ticks: 120,
        }
    }
}
