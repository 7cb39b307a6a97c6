//! A single game definition: configuration, lifecycle state, queue, and
//! (while running) its session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use skirmish_protocol::{Destination, Location, PlayerId};
use skirmish_session::ActiveSession;
use skirmish_tick::{TimerQueue, TimerSlot};

use crate::variant::{PlayContext, SpawnContext, VariantBehavior};
use crate::{Effect, GameError, GameState, VariantType};

// ---------------------------------------------------------------------------
// SpawnConfig
// ---------------------------------------------------------------------------

/// Spawn points and lobby of a definition.
///
/// The registry keeps one committed copy per definition and, during edit
/// mode, one staged copy per operator. Committing replaces the whole value
/// at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpawnConfig {
    /// 1-based slot → location inside the map template.
    #[serde(default)]
    pub spawn_points: BTreeMap<u32, Location>,
    #[serde(default)]
    pub lobby: Option<Location>,
}

impl SpawnConfig {
    /// Highest configured slot, 0 when there are none.
    pub fn highest_slot(&self) -> u32 {
        self.spawn_points.keys().next_back().copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

/// What a definition's single timer is counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// COUNTDOWN has elapsed; begin preparing.
    Countdown,
    /// One preparation tick; `remaining` ticks are left when it fires.
    Preparation { remaining: u32 },
    /// Preparation is over but the environment is missing; `waited` ticks
    /// have passed since.
    AwaitEnvironment { waited: u32 },
    /// One play tick; `elapsed` ticks since STARTED.
    Play { elapsed: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TimerEvent {
    /// Registry key (lower-cased name) of the owning definition.
    pub(crate) key: String,
    pub(crate) kind: TimerKind,
}

// ---------------------------------------------------------------------------
// Persisted and reported shapes
// ---------------------------------------------------------------------------

/// What gets saved for a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionRecord {
    pub name: String,
    pub variant_type: VariantType,
    pub min_players: usize,
    pub max_players: usize,
    pub map_template: String,
    pub state: GameState,
    pub queue_enabled: bool,
    #[serde(default)]
    pub spawn_points: BTreeMap<u32, Location>,
    #[serde(default)]
    pub lobby_spawn: Option<Location>,
}

/// A read-only snapshot for `info`/`list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionInfo {
    pub name: String,
    pub variant_type: VariantType,
    pub map_template: String,
    pub state: GameState,
    pub queue_enabled: bool,
    pub in_queue: usize,
    pub min_players: usize,
    pub max_players: usize,
    pub spawn_points: usize,
    pub has_lobby: bool,
    /// Environment name while a session exists.
    pub session: Option<String>,
    pub participants: usize,
    pub present: usize,
}

// ---------------------------------------------------------------------------
// GameDefinition
// ---------------------------------------------------------------------------

/// One named game.
///
/// Owns its lifecycle state, the ordered queue, the committed spawn
/// configuration, its variant behavior, and while PREPARING/STARTED the
/// [`ActiveSession`]. Cross-definition rules (name uniqueness, one game per
/// player, edit locks) live in the registry.
#[derive(Debug)]
pub struct GameDefinition {
    name: String,
    variant_type: VariantType,
    behavior: Box<dyn VariantBehavior>,
    map_template: String,
    min_players: usize,
    max_players: usize,
    state: GameState,
    queue_enabled: bool,
    spawn: SpawnConfig,
    queue: Vec<PlayerId>,
    session: Option<ActiveSession>,
    pub(crate) timer: TimerSlot,
}

impl GameDefinition {
    pub(crate) fn new(
        name: String,
        variant_type: VariantType,
        behavior: Box<dyn VariantBehavior>,
        min_players: usize,
        map_template: String,
    ) -> Self {
        Self {
            name,
            variant_type,
            behavior,
            map_template,
            min_players,
            max_players: min_players,
            state: GameState::Disabled,
            queue_enabled: true,
            spawn: SpawnConfig::default(),
            queue: Vec::new(),
            session: None,
            timer: TimerSlot::Idle,
        }
    }

    /// Rebuilds a definition from storage. Transient states come back as
    /// READY, and `max_players` is re-derived in case the file was edited.
    pub(crate) fn from_record(record: DefinitionRecord, behavior: Box<dyn VariantBehavior>) -> Self {
        let state = if record.state.is_transient() {
            GameState::Ready
        } else {
            record.state
        };
        let spawn = SpawnConfig {
            spawn_points: record.spawn_points,
            lobby: record.lobby_spawn,
        };
        let max_players = record
            .max_players
            .max(record.min_players)
            .max(spawn.highest_slot() as usize);
        Self {
            name: record.name,
            variant_type: record.variant_type,
            behavior,
            map_template: record.map_template,
            min_players: record.min_players,
            max_players,
            state,
            queue_enabled: record.queue_enabled,
            spawn,
            queue: Vec::new(),
            session: None,
            timer: TimerSlot::Idle,
        }
    }

    pub fn record(&self) -> DefinitionRecord {
        DefinitionRecord {
            name: self.name.clone(),
            variant_type: self.variant_type,
            min_players: self.min_players,
            max_players: self.max_players,
            map_template: self.map_template.clone(),
            state: self.state,
            queue_enabled: self.queue_enabled,
            spawn_points: self.spawn.spawn_points.clone(),
            lobby_spawn: self.spawn.lobby,
        }
    }

    pub fn info(&self) -> DefinitionInfo {
        DefinitionInfo {
            name: self.name.clone(),
            variant_type: self.variant_type,
            map_template: self.map_template.clone(),
            state: self.state,
            queue_enabled: self.queue_enabled,
            in_queue: self.queue.len(),
            min_players: self.min_players,
            max_players: self.max_players,
            spawn_points: self.spawn.spawn_points.len(),
            has_lobby: self.spawn.lobby.is_some(),
            session: self.session.as_ref().map(ActiveSession::environment_name),
            participants: self.session.as_ref().map_or(0, |s| s.participants().len()),
            present: self.session.as_ref().map_or(0, ActiveSession::present_count),
        }
    }

    // -- Accessors --------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant_type(&self) -> VariantType {
        self.variant_type
    }

    pub fn map_template(&self) -> &str {
        &self.map_template
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn min_players(&self) -> usize {
        self.min_players
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    pub fn queue_enabled(&self) -> bool {
        self.queue_enabled
    }

    pub fn spawn_config(&self) -> &SpawnConfig {
        &self.spawn
    }

    pub fn queue(&self) -> &[PlayerId] {
        &self.queue
    }

    pub fn in_queue(&self) -> usize {
        self.queue.len()
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    pub fn timer(&self) -> TimerSlot {
        self.timer
    }

    // -- State machine ----------------------------------------------------

    /// Moves to `target` if the transition table allows it.
    ///
    /// # Errors
    /// [`GameError::StateConflict`] naming `operation`; state is unchanged.
    pub(crate) fn transition(
        &mut self,
        target: GameState,
        operation: &'static str,
    ) -> Result<(), GameError> {
        if !self.state.can_transition_to(target) {
            return Err(self.conflict(operation));
        }
        tracing::info!(
            game = %self.name,
            from = %self.state,
            to = %target,
            "game state changed"
        );
        self.state = target;
        Ok(())
    }

    pub(crate) fn conflict(&self, operation: &'static str) -> GameError {
        GameError::StateConflict {
            name: self.name.clone(),
            state: self.state,
            operation,
        }
    }

    pub(crate) fn set_queue_enabled(&mut self, enabled: bool) {
        self.queue_enabled = enabled;
    }

    /// Replaces the committed spawn configuration in one step and raises
    /// `max_players` to cover the highest slot.
    pub(crate) fn commit_spawn_config(&mut self, staged: SpawnConfig) {
        self.max_players = self.max_players.max(staged.highest_slot() as usize);
        self.spawn = staged;
    }

    // -- Queue ------------------------------------------------------------

    /// Appends `player` to the queue, READY→QUEUE on the first joiner.
    /// Cross-definition checks are the registry's job.
    pub(crate) fn enqueue(&mut self, player: PlayerId) -> Result<(), GameError> {
        if !self.queue_enabled {
            return Err(GameError::QueueDisabled(self.name.clone()));
        }
        if !self.state.accepts_joins() {
            return Err(GameError::NotJoinable {
                name: self.name.clone(),
                state: self.state,
            });
        }
        if self.queue.contains(&player) {
            return Err(GameError::AlreadyQueued {
                player,
                name: self.name.clone(),
            });
        }
        if self.queue.len() >= self.max_players {
            return Err(GameError::QueueFull {
                name: self.name.clone(),
                max_players: self.max_players,
            });
        }
        if self.state == GameState::Ready {
            self.transition(GameState::Queue, "join")?;
        }
        self.queue.push(player);
        Ok(())
    }

    /// Removes `player` from the queue. Returns `false` if absent.
    pub(crate) fn dequeue(&mut self, player: PlayerId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|p| *p != player);
        self.queue.len() != before
    }

    pub(crate) fn take_queue(&mut self) -> Vec<PlayerId> {
        std::mem::take(&mut self.queue)
    }

    pub fn threshold_met(&self) -> bool {
        self.queue.len() >= self.min_players
    }

    // -- Session ----------------------------------------------------------

    pub(crate) fn begin_session(&mut self, session: ActiveSession) {
        debug_assert!(self.session.is_none(), "game {} already has a session", self.name);
        self.session = Some(session);
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut ActiveSession> {
        self.session.as_mut()
    }

    pub(crate) fn take_session(&mut self) -> Option<ActiveSession> {
        self.session.take()
    }

    /// Where each present participant goes when play starts.
    ///
    /// With spawn points configured and no more participants than points,
    /// participants (in queue order) get distinct points in slot order.
    /// Otherwise everyone goes to the variant's single spawn location.
    /// Empty until the environment is attached.
    pub(crate) fn placements(&self) -> Vec<(PlayerId, Destination)> {
        let Some(session) = &self.session else {
            return Vec::new();
        };
        let Some(env) = session.environment() else {
            return Vec::new();
        };
        let world = env.name().to_owned();
        let players: Vec<PlayerId> = session
            .participants()
            .iter()
            .copied()
            .filter(|p| session.is_present(*p))
            .collect();
        let points = &self.spawn.spawn_points;

        let at = |location: Location| Destination::Environment {
            world: world.clone(),
            location,
        };

        if !points.is_empty() && players.len() <= points.len() {
            players
                .into_iter()
                .zip(points.values().copied())
                .map(|(player, location)| (player, at(location)))
                .collect()
        } else {
            let ctx = SpawnContext {
                spawn_points: points,
                environment: env.as_ref(),
            };
            let location = self.behavior.spawn_location(&ctx);
            players.into_iter().map(|p| (p, at(location))).collect()
        }
    }

    /// Runs a variant hook against the current session. `None` when there
    /// is no session.
    pub(crate) fn with_play_context<R>(
        &mut self,
        effects: &mut Vec<Effect>,
        ticks_per_second: u32,
        ticks_played: u64,
        hook: impl FnOnce(&mut dyn VariantBehavior, &mut PlayContext<'_>) -> R,
    ) -> Option<R> {
        let session = self.session.as_ref()?;
        let mut ctx = PlayContext::new(&self.name, session, effects, ticks_played)
            .with_tick_rate(ticks_per_second);
        Some(hook(self.behavior.as_mut(), &mut ctx))
    }

    // -- Timer ------------------------------------------------------------

    /// Schedules this definition's timer. The slot must be idle.
    pub(crate) fn arm_timer(
        &mut self,
        timers: &mut TimerQueue<TimerEvent>,
        key: &str,
        after_ticks: u32,
        kind: TimerKind,
    ) {
        let token = timers.schedule(
            u64::from(after_ticks),
            TimerEvent {
                key: key.to_owned(),
                kind,
            },
        );
        self.timer.arm(token);
    }

    /// Cancels the pending timer, if any, returning what it was counting.
    /// Always called before a state change that invalidates it.
    pub(crate) fn cancel_timer(&mut self, timers: &mut TimerQueue<TimerEvent>) -> Option<TimerKind> {
        let token = self.timer.disarm()?;
        tracing::debug!(game = %self.name, %token, "timer cancelled");
        timers.cancel(token).map(|event| event.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Deathmatch;

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn definition(min_players: usize) -> GameDefinition {
        GameDefinition::new(
            "Pit".into(),
            VariantType::Deathmatch,
            Box::new(Deathmatch),
            min_players,
            "pit".into(),
        )
    }

    #[test]
    fn test_new_definition_is_disabled_with_open_queue() {
        let def = definition(2);
        assert_eq!(def.state(), GameState::Disabled);
        assert!(def.queue_enabled());
        assert_eq!(def.max_players(), 2);
        assert!(def.timer().is_idle());
    }

    #[test]
    fn test_transition_rejects_illegal_move_and_keeps_state() {
        let mut def = definition(2);
        let err = def.transition(GameState::Started, "start").unwrap_err();
        assert!(matches!(err, GameError::StateConflict { operation: "start", .. }));
        assert_eq!(def.state(), GameState::Disabled);
    }

    #[test]
    fn test_enqueue_first_joiner_moves_ready_to_queue() {
        let mut def = definition(2);
        def.transition(GameState::Ready, "enable").unwrap();
        def.enqueue(pid(1)).unwrap();
        assert_eq!(def.state(), GameState::Queue);
        assert_eq!(def.queue(), &[pid(1)]);
        assert!(!def.threshold_met());
    }

    #[test]
    fn test_enqueue_rejections() {
        let mut def = definition(1);
        assert!(matches!(def.enqueue(pid(1)), Err(GameError::NotJoinable { .. })));

        def.transition(GameState::Ready, "enable").unwrap();
        def.set_queue_enabled(false);
        assert!(matches!(def.enqueue(pid(1)), Err(GameError::QueueDisabled(_))));

        def.set_queue_enabled(true);
        def.enqueue(pid(1)).unwrap();
        assert!(matches!(def.enqueue(pid(1)), Err(GameError::AlreadyQueued { .. })));
        assert!(matches!(
            def.enqueue(pid(2)),
            Err(GameError::QueueFull { max_players: 1, .. })
        ));
        assert_eq!(def.in_queue(), 1);
    }

    #[test]
    fn test_dequeue_absent_returns_false() {
        let mut def = definition(2);
        assert!(!def.dequeue(pid(1)));
    }

    #[test]
    fn test_commit_raises_max_players_to_highest_slot() {
        let mut def = definition(1);
        let mut staged = SpawnConfig::default();
        staged.spawn_points.insert(3, Location::new(0.0, 64.0, 0.0));

        def.commit_spawn_config(staged);
        assert_eq!(def.max_players(), 3);
        assert_eq!(def.spawn_config().spawn_points.len(), 1);
    }

    #[test]
    fn test_commit_never_lowers_max_players() {
        let mut def = definition(4);
        let mut staged = SpawnConfig::default();
        staged.spawn_points.insert(1, Location::new(0.0, 64.0, 0.0));
        def.commit_spawn_config(staged);
        assert_eq!(def.max_players(), 4);
    }

    #[test]
    fn test_from_record_normalises_transient_state() {
        let mut record = definition(2).record();
        record.state = GameState::Started;
        record.max_players = 0;
        record.spawn_points.insert(5, Location::new(1.0, 2.0, 3.0));

        let def = GameDefinition::from_record(record, Box::new(Deathmatch));
        assert_eq!(def.state(), GameState::Ready);
        assert_eq!(def.max_players(), 5);
    }

    #[test]
    fn test_from_record_keeps_disabled() {
        let record = definition(2).record();
        let def = GameDefinition::from_record(record, Box::new(Deathmatch));
        assert_eq!(def.state(), GameState::Disabled);
    }

    #[test]
    fn test_record_json_uses_string_slot_keys() {
        let mut def = definition(1);
        let mut staged = SpawnConfig::default();
        staged.spawn_points.insert(2, Location::new(1.0, 2.0, 3.0));
        def.commit_spawn_config(staged);

        let json = serde_json::to_value(def.record()).unwrap();
        assert_eq!(json["state"], "DISABLED");
        assert_eq!(json["variant_type"], "deathmatch");
        assert_eq!(json["spawn_points"]["2"]["x"], 1.0);
    }
}
