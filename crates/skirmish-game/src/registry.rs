//! The game registry: every definition, who is queued or playing where,
//! who is editing what, and the timers that drive them.

use std::collections::HashMap;
use std::sync::Arc;

use skirmish_protocol::{Destination, Location, Notice, PlayerId};
use skirmish_session::{
    ActiveSession, SessionEnvironment, SessionError, SessionId, Teardown, TeardownQueue,
};
use skirmish_tick::TimerQueue;

use crate::definition::{TimerEvent, TimerKind};
use crate::effect::notify_all;
use crate::variant::VariantOutcome;
use crate::{
    AdmissionPolicy, DefinitionInfo, DefinitionRecord, Effect, GameDefinition, GameError,
    GameState, RegistryConfig, SpawnConfig, VariantCatalog, VariantType,
};

/// Registry lookups are case-insensitive.
fn key_of(name: &str) -> String {
    name.trim().to_lowercase()
}

/// One operator's open edit transaction.
#[derive(Debug, Clone)]
pub struct EditSession {
    key: String,
    staged: SpawnConfig,
}

impl EditSession {
    /// Registry key of the definition being edited.
    pub fn game(&self) -> &str {
        &self.key
    }

    pub fn staged(&self) -> &SpawnConfig {
        &self.staged
    }
}

/// Owns all game definitions and enforces the rules that span them.
///
/// The registry is a plain synchronous state machine: it performs no I/O
/// and never blocks. Every operation that needs the outside world appends
/// an [`Effect`]; the owner drains them with [`take_effects`](Self::take_effects)
/// after each call. Time only advances through [`tick`](Self::tick).
///
/// Key invariant: a player is queued for or playing in at most one game.
#[derive(Debug)]
pub struct GameRegistry {
    config: RegistryConfig,
    catalog: VariantCatalog,

    /// Definitions keyed by lower-cased name.
    definitions: HashMap<String, GameDefinition>,

    /// Player → key of the game they are queued for or playing in.
    player_games: HashMap<PlayerId, String>,

    /// Operator → open edit transaction.
    editors: HashMap<PlayerId, EditSession>,

    timers: TimerQueue<TimerEvent>,
    teardowns: TeardownQueue,
    effects: Vec<Effect>,
}

impl GameRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_catalog(config, VariantCatalog::default())
    }

    pub fn with_catalog(config: RegistryConfig, catalog: VariantCatalog) -> Self {
        Self {
            config,
            catalog,
            definitions: HashMap::new(),
            player_games: HashMap::new(),
            editors: HashMap::new(),
            timers: TimerQueue::new(),
            teardowns: TeardownQueue::new(),
            effects: Vec::new(),
        }
    }

    /// Rebuilds a registry from stored records.
    ///
    /// Transient states come back as READY. A record whose name collides
    /// (case-insensitively) with an earlier one is skipped.
    pub fn from_records(
        config: RegistryConfig,
        catalog: VariantCatalog,
        records: impl IntoIterator<Item = DefinitionRecord>,
    ) -> Self {
        let mut registry = Self::with_catalog(config, catalog);
        for record in records {
            let key = key_of(&record.name);
            if registry.definitions.contains_key(&key) {
                tracing::warn!(game = %record.name, "duplicate stored definition skipped");
                continue;
            }
            let behavior = registry.catalog.build(record.variant_type);
            let definition = GameDefinition::from_record(record, behavior);
            registry.definitions.insert(key, definition);
        }
        tracing::info!(count = registry.definitions.len(), "definitions loaded");
        registry
    }

    /// Records for every definition, sorted by key.
    pub fn records(&self) -> Vec<DefinitionRecord> {
        let mut keys: Vec<&String> = self.definitions.keys().collect();
        keys.sort();
        keys.into_iter()
            .map(|key| self.definitions[key].record())
            .collect()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Removes and returns all side effects produced so far.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn definition(&self, name: &str) -> Option<&GameDefinition> {
        self.definitions.get(&key_of(name))
    }

    pub fn info(&self, name: &str) -> Result<DefinitionInfo, GameError> {
        self.definition(name)
            .map(GameDefinition::info)
            .ok_or_else(|| GameError::NotFound(name.to_owned()))
    }

    /// Snapshots of every definition, sorted by name.
    pub fn list(&self) -> Vec<DefinitionInfo> {
        let mut infos: Vec<DefinitionInfo> =
            self.definitions.values().map(GameDefinition::info).collect();
        infos.sort_by_key(|info| key_of(&info.name));
        infos
    }

    /// Display name of the game `player` is queued for or playing in.
    pub fn player_current_game(&self, player: PlayerId) -> Option<String> {
        let key = self.player_games.get(&player)?;
        self.definitions.get(key).map(|def| def.name().to_owned())
    }

    /// The definition `operator` is editing, if any.
    pub fn editing(&self, operator: PlayerId) -> Option<&EditSession> {
        self.editors.get(&operator)
    }

    /// Number of timers still scheduled across all definitions.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Environments waiting for the next tick to be destroyed.
    pub fn pending_teardowns(&self) -> usize {
        self.teardowns.len()
    }

    fn lookup(&self, name: &str) -> Result<(String, &GameDefinition), GameError> {
        let key = key_of(name);
        match self.definitions.get(&key) {
            Some(def) => Ok((key, def)),
            None => Err(GameError::NotFound(name.to_owned())),
        }
    }

    fn lookup_mut(&mut self, name: &str) -> Result<(String, &mut GameDefinition), GameError> {
        let key = key_of(name);
        match self.definitions.get_mut(&key) {
            Some(def) => Ok((key, def)),
            None => Err(GameError::NotFound(name.to_owned())),
        }
    }

    fn persist(&mut self, key: &str) {
        if let Some(def) = self.definitions.get(key) {
            self.effects.push(Effect::Persist(def.record()));
        }
    }

    // -----------------------------------------------------------------------
    // Definition management
    // -----------------------------------------------------------------------

    /// Registers a new definition in DISABLED.
    ///
    /// # Errors
    ///
    /// - [`GameError::Validation`] for an empty or whitespace-containing
    ///   name, `min_players == 0`, or an empty map template
    /// - [`GameError::DuplicateName`] if the name is taken, ignoring case
    /// - [`GameError::InvalidType`] for an unknown variant type
    pub fn create_definition(
        &mut self,
        name: &str,
        variant_type: &str,
        min_players: usize,
        map_template: &str,
    ) -> Result<DefinitionInfo, GameError> {
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(GameError::Validation(format!(
                "game name {name:?} must be a single non-empty word"
            )));
        }
        let key = key_of(name);
        if self.definitions.contains_key(&key) {
            return Err(GameError::DuplicateName(name.to_owned()));
        }
        let variant_type: VariantType = variant_type.parse()?;
        if min_players < 1 {
            return Err(GameError::Validation(
                "minimum players must be at least 1".into(),
            ));
        }
        let map_template = map_template.trim();
        if map_template.is_empty() {
            return Err(GameError::Validation("map template must not be empty".into()));
        }

        let definition = GameDefinition::new(
            name.to_owned(),
            variant_type,
            self.catalog.build(variant_type),
            min_players,
            map_template.to_owned(),
        );
        let info = definition.info();
        self.definitions.insert(key.clone(), definition);
        self.persist(&key);
        tracing::info!(game = %name, %variant_type, min_players, map = %map_template, "game created");
        Ok(info)
    }

    /// DISABLED → READY.
    pub fn enable(&mut self, name: &str) -> Result<(), GameError> {
        let (key, def) = self.lookup_mut(name)?;
        def.transition(GameState::Ready, "enable")?;
        self.persist(&key);
        Ok(())
    }

    /// Opens or closes the queue without touching the lifecycle state.
    pub fn set_queue_enabled(&mut self, name: &str, enabled: bool) -> Result<(), GameError> {
        let (key, def) = self.lookup_mut(name)?;
        def.set_queue_enabled(enabled);
        tracing::info!(game = %def.name(), enabled, "queue toggled");
        self.persist(&key);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Edit mode
    // -----------------------------------------------------------------------

    /// Starts an edit transaction on `name` for `operator`, staging a copy
    /// of the committed spawn configuration. Re-entering the game already
    /// being edited is a no-op.
    pub fn enter_edit_mode(&mut self, operator: PlayerId, name: &str) -> Result<(), GameError> {
        let (key, def) = self.lookup(name)?;
        if let Some(current) = self.editors.get(&operator) {
            if current.key == key {
                return Ok(());
            }
            let editing = self
                .definitions
                .get(&current.key)
                .map_or_else(|| current.key.clone(), |d| d.name().to_owned());
            return Err(GameError::OperatorBusy { operator, editing });
        }
        if let Some((&holder, _)) = self.editors.iter().find(|(_, edit)| edit.key == key) {
            return Err(GameError::AlreadyEditing {
                name: def.name().to_owned(),
                operator: holder,
            });
        }

        let staged = def.spawn_config().clone();
        tracing::info!(game = %def.name(), %operator, "edit mode entered");
        self.editors.insert(operator, EditSession { key, staged });
        Ok(())
    }

    fn staged_mut(&mut self, operator: PlayerId) -> Result<&mut SpawnConfig, GameError> {
        self.editors
            .get_mut(&operator)
            .map(|edit| &mut edit.staged)
            .ok_or(GameError::NotEditing(operator))
    }

    /// Stages spawn point `index` (1-based).
    pub fn set_staged_spawn_point(
        &mut self,
        operator: PlayerId,
        index: u32,
        location: Location,
    ) -> Result<(), GameError> {
        let staged = self.staged_mut(operator)?;
        if index == 0 {
            return Err(GameError::Validation("spawn slots start at 1".into()));
        }
        staged.spawn_points.insert(index, location);
        Ok(())
    }

    pub fn set_staged_lobby(
        &mut self,
        operator: PlayerId,
        location: Location,
    ) -> Result<(), GameError> {
        self.staged_mut(operator)?.lobby = Some(location);
        Ok(())
    }

    pub fn staged_config(&self, operator: PlayerId) -> Result<&SpawnConfig, GameError> {
        self.editors
            .get(&operator)
            .map(EditSession::staged)
            .ok_or(GameError::NotEditing(operator))
    }

    /// Commits the staged configuration, persists, and closes the edit.
    pub fn save_and_exit(&mut self, operator: PlayerId) -> Result<DefinitionInfo, GameError> {
        let edit = self
            .editors
            .remove(&operator)
            .ok_or(GameError::NotEditing(operator))?;
        let def = self
            .definitions
            .get_mut(&edit.key)
            .ok_or_else(|| GameError::NotFound(edit.key.clone()))?;
        def.commit_spawn_config(edit.staged);
        let info = def.info();
        tracing::info!(
            game = %def.name(),
            %operator,
            spawn_points = info.spawn_points,
            max_players = info.max_players,
            "edit saved"
        );
        self.persist(&edit.key);
        Ok(info)
    }

    /// Drops the staged configuration and closes the edit.
    pub fn discard_and_exit(&mut self, operator: PlayerId) -> Result<(), GameError> {
        let edit = self
            .editors
            .remove(&operator)
            .ok_or(GameError::NotEditing(operator))?;
        tracing::info!(game = %edit.key, %operator, "edit discarded");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Operator lifecycle control
    // -----------------------------------------------------------------------

    /// COUNTDOWN → PREPARING.
    pub fn start(&mut self, name: &str) -> Result<(), GameError> {
        let (key, def) = self.lookup(name)?;
        if def.state() != GameState::Countdown {
            return Err(def.conflict("start"));
        }
        self.begin_preparation(&key)
    }

    /// Forces the definition to DISABLED from QUEUE, COUNTDOWN, STARTED or
    /// FINAL, ending any running session and emptying the queue.
    pub fn stop(&mut self, name: &str) -> Result<(), GameError> {
        let key = key_of(name);
        let Some(def) = self.definitions.get_mut(&key) else {
            return Err(GameError::NotFound(name.to_owned()));
        };
        let prior = def.state();
        if !prior.can_stop() {
            return Err(def.conflict("stop"));
        }

        let cancelled = def.cancel_timer(&mut self.timers);
        let game = def.name().to_owned();
        let queued = def.take_queue();
        notify_all(
            &mut self.effects,
            &queued,
            Notice::GameStopped { game: game.clone() },
        );
        for player in &queued {
            self.player_games.remove(player);
        }

        if prior == GameState::Started {
            let ticks_played = match cancelled {
                Some(TimerKind::Play { elapsed }) => elapsed.saturating_sub(1),
                _ => 0,
            };
            self.end_session(&key, Some(ticks_played), |game| Notice::GameStopped { game });
        }

        if let Some(def) = self.definitions.get_mut(&key) {
            def.transition(GameState::Disabled, "stop")?;
        }
        self.persist(&key);
        tracing::info!(%game, from = %prior, "game stopped");
        Ok(())
    }

    /// Winds everything down before the process exits.
    ///
    /// Running and preparing sessions end as if stopped, queues are
    /// emptied and every environment still alive, including those ended
    /// earlier but not yet collected by [`tick`](Self::tick), is handed out
    /// as [`Effect::Destroy`]. Definitions keep their persisted state.
    pub fn shutdown(&mut self) {
        let mut keys: Vec<String> = self.definitions.keys().cloned().collect();
        keys.sort();
        for key in keys {
            let Some(def) = self.definitions.get_mut(&key) else {
                continue;
            };
            let state = def.state();
            let cancelled = def.cancel_timer(&mut self.timers);
            let game = def.name().to_owned();
            let queued = def.take_queue();
            notify_all(
                &mut self.effects,
                &queued,
                Notice::GameStopped { game: game.clone() },
            );
            for player in &queued {
                self.player_games.remove(player);
            }

            match state {
                GameState::Started => {
                    let ticks_played = match cancelled {
                        Some(TimerKind::Play { elapsed }) => elapsed.saturating_sub(1),
                        _ => 0,
                    };
                    if let Err(err) = def.transition(GameState::Final, "shutdown") {
                        tracing::warn!(error = %err, "cannot finish game on shutdown");
                    }
                    self.end_session(&key, Some(ticks_played), |game| Notice::GameStopped { game });
                }
                GameState::Preparing => {
                    let present = def.session().map(ActiveSession::present).unwrap_or_default();
                    for player in present {
                        self.effects.push(Effect::LockMovement {
                            player,
                            locked: false,
                        });
                    }
                    if let Err(err) = def.transition(GameState::Ready, "shutdown") {
                        tracing::warn!(error = %err, "cannot revert preparation on shutdown");
                    }
                    self.end_session(&key, None, |game| Notice::GameStopped { game });
                }
                _ => {}
            }
        }

        let pending = self.teardowns.len();
        for teardown in self.teardowns.drain() {
            self.effects.push(Effect::Destroy(teardown));
        }
        tracing::info!(environments = pending, "registry shut down");
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    /// Adds `player` to the queue of `name`.
    ///
    /// The first joiner moves READY → QUEUE. Reaching `min_players` moves
    /// QUEUE → COUNTDOWN and applies the admission policy.
    pub fn join_queue(&mut self, player: PlayerId, name: &str) -> Result<(), GameError> {
        let key = key_of(name);
        if !self.definitions.contains_key(&key) {
            return Err(GameError::NotFound(name.to_owned()));
        }
        if let Some(current) = self.player_games.get(&player) {
            let current_name = self
                .definitions
                .get(current)
                .map_or_else(|| current.clone(), |d| d.name().to_owned());
            return Err(if *current == key {
                GameError::AlreadyQueued {
                    player,
                    name: current_name,
                }
            } else {
                GameError::AlreadyQueuedElsewhere {
                    player,
                    name: current_name,
                }
            });
        }

        let Some(def) = self.definitions.get_mut(&key) else {
            return Err(GameError::NotFound(name.to_owned()));
        };
        def.enqueue(player)?;
        self.player_games.insert(player, key.clone());
        tracing::info!(game = %def.name(), %player, queued = def.in_queue(), "player queued");
        self.effects.push(Effect::Notify {
            player,
            notice: Notice::QueueJoined {
                game: def.name().to_owned(),
                queued: def.in_queue(),
                needed: def.min_players(),
            },
        });

        if def.state() == GameState::Queue && def.threshold_met() {
            def.transition(GameState::Countdown, "join")?;
            let seconds = match self.config.admission_policy {
                AdmissionPolicy::Immediate => {
                    let ticks = self.config.countdown_ticks;
                    def.arm_timer(&mut self.timers, &key, ticks, TimerKind::Countdown);
                    Some(self.config.seconds(ticks))
                }
                AdmissionPolicy::OperatorConfirmed => None,
            };
            let notice = Notice::CountdownStarted {
                game: def.name().to_owned(),
                seconds,
            };
            notify_all(&mut self.effects, def.queue(), notice);
        }
        Ok(())
    }

    /// Takes `player` out of their queue. A participant of a running
    /// session leaves the game instead, exactly as [`player_left`](Self::player_left).
    pub fn leave_queue(&mut self, player: PlayerId) -> Result<(), GameError> {
        self.player_left(player)
    }

    /// The host reports that `player` quit or was eliminated. Queued
    /// players are dequeued; participants leave the session.
    pub fn player_left(&mut self, player: PlayerId) -> Result<(), GameError> {
        let key = self
            .player_games
            .get(&player)
            .cloned()
            .ok_or(GameError::NotQueued(player))?;
        if self.is_participant(&key, player) {
            self.remove_participant(&key, player);
            Ok(())
        } else if self.remove_queued(&key, player) {
            Ok(())
        } else {
            self.player_games.remove(&player);
            Err(GameError::NotQueued(player))
        }
    }

    fn is_participant(&self, key: &str, player: PlayerId) -> bool {
        self.definitions
            .get(key)
            .and_then(GameDefinition::session)
            .is_some_and(|session| session.is_present(player))
    }

    fn remove_queued(&mut self, key: &str, player: PlayerId) -> bool {
        let Some(def) = self.definitions.get_mut(key) else {
            return false;
        };
        if !def.dequeue(player) {
            return false;
        }
        self.player_games.remove(&player);
        let game = def.name().to_owned();
        tracing::info!(%game, %player, queued = def.in_queue(), "player left queue");
        self.effects.push(Effect::Notify {
            player,
            notice: Notice::QueueLeft { game: game.clone() },
        });

        if def.state() == GameState::Countdown && !def.threshold_met() {
            def.cancel_timer(&mut self.timers);
            if def.transition(GameState::Queue, "leave").is_ok() {
                notify_all(
                    &mut self.effects,
                    def.queue(),
                    Notice::CountdownCancelled { game },
                );
            }
        }
        if def.state() == GameState::Queue && def.in_queue() == 0 {
            let _ = def.transition(GameState::Ready, "leave");
        }
        true
    }

    fn remove_participant(&mut self, key: &str, player: PlayerId) {
        let Some(def) = self.definitions.get_mut(key) else {
            return;
        };
        let state = def.state();
        let Some(session) = def.session_mut() else {
            return;
        };
        if !session.remove(player) {
            return;
        }
        self.player_games.remove(&player);
        tracing::info!(game = %def.name(), %player, %state, "participant left");

        match state {
            GameState::Preparing => {
                self.effects.push(Effect::LockMovement {
                    player,
                    locked: false,
                });
            }
            GameState::Started => {
                let rate = self.config.ticks_per_second;
                def.with_play_context(&mut self.effects, rate, 0, |behavior, ctx| {
                    behavior.on_player_out(ctx, player);
                });
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Clears participation bookkeeping for `still_present` and for any
    /// remaining entries that point at `name`.
    pub fn on_session_ended(&mut self, name: &str, still_present: &[PlayerId]) {
        let key = key_of(name);
        for player in still_present {
            if self.player_games.get(player) == Some(&key) {
                self.player_games.remove(player);
            }
        }
        self.player_games.retain(|_, game| *game != key);
    }

    /// Feeds back the result of a [`Effect::Provision`].
    ///
    /// An environment for a session that is no longer waiting (stopped,
    /// failed, or superseded) is queued for destruction.
    pub fn on_provisioned(
        &mut self,
        name: &str,
        session_id: &SessionId,
        result: Result<Arc<dyn SessionEnvironment>, SessionError>,
    ) {
        let key = key_of(name);
        let Some(def) = self.definitions.get_mut(&key) else {
            tracing::warn!(game = %name, %session_id, "provisioning result for unknown game");
            return;
        };
        let pending = def.state() == GameState::Preparing
            && def
                .session()
                .is_some_and(|s| s.id() == session_id && !s.is_provisioned());

        match result {
            Ok(environment) if pending => {
                tracing::info!(
                    game = %def.name(),
                    environment = %environment.name(),
                    "environment attached"
                );
                if let Some(session) = def.session_mut() {
                    session.attach(environment);
                }
            }
            Ok(environment) => {
                tracing::warn!(
                    game = %def.name(),
                    environment = %environment.name(),
                    "environment arrived for a session that is no longer pending"
                );
                self.teardowns.push(Teardown {
                    map_template: def.map_template().to_owned(),
                    session_id: session_id.clone(),
                });
            }
            Err(err) if pending => {
                tracing::error!(game = %def.name(), error = %err, "provisioning failed");
                self.abort_preparation(&key);
            }
            Err(err) => {
                tracing::warn!(game = %def.name(), error = %err, "stale provisioning failure ignored");
            }
        }
    }

    fn begin_preparation(&mut self, key: &str) -> Result<(), GameError> {
        let Some(def) = self.definitions.get_mut(key) else {
            return Err(GameError::NotFound(key.to_owned()));
        };
        def.cancel_timer(&mut self.timers);
        def.transition(GameState::Preparing, "start")?;

        let participants = def.take_queue();
        let session = ActiveSession::new(def.map_template(), participants.clone());
        tracing::info!(
            game = %def.name(),
            session = %session.id(),
            participants = participants.len(),
            "preparing session"
        );
        self.effects.push(Effect::Provision {
            game: def.name().to_owned(),
            map_template: def.map_template().to_owned(),
            session_id: session.id().clone(),
        });
        def.begin_session(session);

        let lobby = def.spawn_config().lobby;
        for &player in &participants {
            if let Some(location) = lobby {
                self.effects.push(Effect::Relocate {
                    player,
                    destination: Destination::Lobby { location },
                });
            }
            self.effects.push(Effect::LockMovement {
                player,
                locked: true,
            });
        }

        self.preparation_step(key, self.config.preparation_ticks);
        Ok(())
    }

    /// Runs when `remaining` ticks of preparation are left. At zero the
    /// game starts once the environment is attached.
    fn preparation_step(&mut self, key: &str, remaining: u32) {
        let Some(def) = self.definitions.get_mut(key) else {
            return;
        };
        if remaining > 0 {
            if let Some(seconds_left) = self.config.preparation_checkpoint(remaining) {
                let present = def.session().map(ActiveSession::present).unwrap_or_default();
                let notice = Notice::Preparing {
                    game: def.name().to_owned(),
                    seconds_left,
                };
                notify_all(&mut self.effects, &present, notice);
            }
            def.arm_timer(
                &mut self.timers,
                key,
                1,
                TimerKind::Preparation {
                    remaining: remaining - 1,
                },
            );
            return;
        }

        self.await_environment(key, 0);
    }

    /// Starts play once the environment is attached. A game still waiting
    /// after `provision_timeout_ticks` is aborted like a failed provision.
    fn await_environment(&mut self, key: &str, waited: u32) {
        let Some(def) = self.definitions.get_mut(key) else {
            return;
        };
        if def.session().is_some_and(ActiveSession::is_provisioned) {
            self.begin_play(key);
            return;
        }
        if waited >= self.config.provision_timeout_ticks {
            tracing::error!(game = %def.name(), waited, "environment never arrived");
            self.abort_preparation(key);
            return;
        }
        if waited == 0 {
            tracing::debug!(game = %def.name(), "waiting for environment");
        }
        def.arm_timer(
            &mut self.timers,
            key,
            1,
            TimerKind::AwaitEnvironment { waited: waited + 1 },
        );
    }

    fn begin_play(&mut self, key: &str) {
        let Some(def) = self.definitions.get_mut(key) else {
            return;
        };
        if let Err(err) = def.transition(GameState::Started, "start") {
            tracing::warn!(error = %err, "cannot start game");
            return;
        }

        for (player, destination) in def.placements() {
            self.effects.push(Effect::LockMovement {
                player,
                locked: false,
            });
            self.effects.push(Effect::Relocate {
                player,
                destination,
            });
        }
        let present = def.session().map(ActiveSession::present).unwrap_or_default();
        notify_all(
            &mut self.effects,
            &present,
            Notice::GameStarted {
                game: def.name().to_owned(),
            },
        );
        let rate = self.config.ticks_per_second;
        def.with_play_context(&mut self.effects, rate, 0, |behavior, ctx| behavior.on_start(ctx));
        def.arm_timer(&mut self.timers, key, 1, TimerKind::Play { elapsed: 1 });
    }

    fn play_step(&mut self, key: &str, elapsed: u64) {
        let Some(def) = self.definitions.get_mut(key) else {
            return;
        };
        let rate = self.config.ticks_per_second;
        let outcome = def
            .with_play_context(&mut self.effects, rate, elapsed, |behavior, ctx| {
                behavior.on_tick(ctx)
            })
            .unwrap_or(VariantOutcome::Finished);

        match outcome {
            VariantOutcome::Continue => {
                def.arm_timer(
                    &mut self.timers,
                    key,
                    1,
                    TimerKind::Play {
                        elapsed: elapsed + 1,
                    },
                );
            }
            VariantOutcome::Finished => {
                if let Err(err) = def.transition(GameState::Final, "finish") {
                    tracing::warn!(error = %err, "cannot finish game");
                    return;
                }
                self.end_session(key, Some(elapsed), |game| Notice::GameEnded { game });
            }
        }
    }

    /// Ends the running session: variant end hook (if play began), notice
    /// and relocation for everyone still present, deferred destruction of
    /// the environment, and bookkeeping cleanup.
    fn end_session(
        &mut self,
        key: &str,
        ticks_played: Option<u64>,
        notice: impl FnOnce(String) -> Notice,
    ) {
        let Some(def) = self.definitions.get_mut(key) else {
            return;
        };
        if let Some(ticks) = ticks_played {
            let rate = self.config.ticks_per_second;
            def.with_play_context(&mut self.effects, rate, ticks, |behavior, ctx| behavior.on_end(ctx));
        }
        let Some(session) = def.take_session() else {
            self.on_session_ended(key, &[]);
            return;
        };

        let present = session.present();
        notify_all(&mut self.effects, &present, notice(def.name().to_owned()));
        let destination = match def.spawn_config().lobby {
            Some(location) => Destination::Lobby { location },
            None => Destination::WorldSpawn,
        };
        for &player in &present {
            self.effects.push(Effect::Relocate {
                player,
                destination: destination.clone(),
            });
        }
        tracing::info!(
            game = %def.name(),
            session = %session.id(),
            remaining = present.len(),
            "session ended"
        );
        if session.is_provisioned() {
            self.teardowns.push(session.into_teardown());
        }
        self.on_session_ended(key, &present);
    }

    fn abort_preparation(&mut self, key: &str) {
        let Some(def) = self.definitions.get_mut(key) else {
            return;
        };
        def.cancel_timer(&mut self.timers);
        let present = def
            .take_session()
            .map(|session| session.present())
            .unwrap_or_default();
        let game = def.name().to_owned();
        for &player in &present {
            self.effects.push(Effect::LockMovement {
                player,
                locked: false,
            });
        }
        notify_all(&mut self.effects, &present, Notice::ProvisionFailed { game });
        for player in def.take_queue() {
            self.player_games.remove(&player);
        }
        if let Err(err) = def.transition(GameState::Ready, "provision") {
            tracing::warn!(error = %err, "cannot revert failed preparation");
        }
        self.on_session_ended(key, &present);
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advances the registry by one scheduler tick.
    ///
    /// Environments ended during the previous tick are destroyed first and
    /// FINAL definitions return to READY; then due timers fire.
    pub fn tick(&mut self) {
        for teardown in self.teardowns.drain() {
            self.effects.push(Effect::Destroy(teardown));
        }
        for def in self.definitions.values_mut() {
            if def.state() == GameState::Final {
                let _ = def.transition(GameState::Ready, "reset");
            }
        }

        for (token, event) in self.timers.advance() {
            let TimerEvent { key, kind } = event;
            let Some(def) = self.definitions.get_mut(&key) else {
                continue;
            };
            if !def.timer.holds(token) {
                tracing::debug!(game = %def.name(), %token, "stale timer ignored");
                continue;
            }
            def.timer.disarm();

            match kind {
                TimerKind::Countdown => {
                    if let Err(err) = self.begin_preparation(&key) {
                        tracing::warn!(error = %err, "countdown elapsed but game cannot start");
                    }
                }
                TimerKind::Preparation { remaining } => self.preparation_step(&key, remaining),
                TimerKind::AwaitEnvironment { waited } => self.await_environment(&key, waited),
                TimerKind::Play { elapsed } => self.play_step(&key, elapsed),
            }
        }
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn registry_with(name: &str, min_players: usize) -> GameRegistry {
        let mut registry = GameRegistry::default();
        registry
            .create_definition(name, "deathmatch", min_players, "pit")
            .unwrap();
        registry.enable(name).unwrap();
        registry.take_effects();
        registry
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = registry_with("Pit", 2);
        assert_eq!(registry.info("pIT").unwrap().name, "Pit");
        assert!(registry.definition("PIT").is_some());
    }

    #[test]
    fn test_create_rejects_whitespace_name() {
        let mut registry = GameRegistry::default();
        let err = registry
            .create_definition("big pit", "deathmatch", 2, "pit")
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
        assert!(registry.list().is_empty());
        assert!(registry.take_effects().is_empty());
    }

    #[test]
    fn test_stale_bookkeeping_is_cleared_on_leave() {
        let mut registry = registry_with("Pit", 2);
        registry.player_games.insert(pid(9), "pit".into());
        assert!(matches!(
            registry.leave_queue(pid(9)),
            Err(GameError::NotQueued(_))
        ));
        assert_eq!(registry.player_current_game(pid(9)), None);
    }

    #[test]
    fn test_on_session_ended_clears_entries_for_game() {
        let mut registry = registry_with("Pit", 2);
        registry.player_games.insert(pid(1), "pit".into());
        registry.player_games.insert(pid(2), "other".into());
        registry.on_session_ended("PIT", &[]);
        assert_eq!(registry.player_games.len(), 1);
        assert!(registry.player_games.contains_key(&pid(2)));
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let mut registry = registry_with("Pit", 1);
        // Schedule a timer the definition does not hold.
        registry.timers.schedule(
            1,
            TimerEvent {
                key: "pit".into(),
                kind: TimerKind::Countdown,
            },
        );
        registry.tick();
        assert_eq!(registry.definition("pit").unwrap().state(), GameState::Ready);
        assert!(registry.take_effects().is_empty());
    }
}
