//! The `VariantBehavior` trait: the extension point for game variants.
//!
//! The registry drives the lifecycle; a variant only supplies the rules
//! that differ between games: where players spawn, what happens when play
//! starts and ends, and when the game is over.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use skirmish_protocol::{Destination, Location, Notice, PlayerId};
use skirmish_session::{ActiveSession, SessionEnvironment};

use crate::{Effect, GameError};

// ---------------------------------------------------------------------------
// VariantType
// ---------------------------------------------------------------------------

/// The enumerated tag stored with every definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantType {
    /// Last player standing wins.
    Deathmatch,
    /// Survive waves together until nobody is left.
    Waves,
}

impl VariantType {
    pub const ALL: [VariantType; 2] = [VariantType::Deathmatch, VariantType::Waves];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deathmatch => "deathmatch",
            Self::Waves => "waves",
        }
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantType {
    type Err = GameError;

    /// Case-insensitive, so `/game create pit DeathMatch ...` works.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GameError::InvalidType(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Hook contexts
// ---------------------------------------------------------------------------

/// What a variant may look at when choosing a spawn location.
pub struct SpawnContext<'a> {
    /// Committed spawn points by 1-based slot.
    pub spawn_points: &'a BTreeMap<u32, Location>,
    pub environment: &'a dyn SessionEnvironment,
}

/// The default single-point spawn rule: the first configured spawn point,
/// or the environment's default point when none is configured.
pub fn default_spawn_location(ctx: &SpawnContext<'_>) -> Location {
    ctx.spawn_points
        .values()
        .next()
        .copied()
        .unwrap_or_else(|| ctx.environment.default_spawn_point())
}

/// Handed to the play hooks. Reads come from the running session; writes
/// become [`Effect`]s the orchestrator carries out after the hook returns.
pub struct PlayContext<'a> {
    game: &'a str,
    session: &'a ActiveSession,
    effects: &'a mut Vec<Effect>,
    ticks_played: u64,
    ticks_per_second: u32,
}

impl<'a> PlayContext<'a> {
    pub(crate) fn new(
        game: &'a str,
        session: &'a ActiveSession,
        effects: &'a mut Vec<Effect>,
        ticks_played: u64,
    ) -> Self {
        Self {
            game,
            session,
            effects,
            ticks_played,
            ticks_per_second: 1,
        }
    }

    pub(crate) fn with_tick_rate(mut self, ticks_per_second: u32) -> Self {
        self.ticks_per_second = ticks_per_second.max(1);
        self
    }

    /// Display name of the game.
    pub fn game(&self) -> &str {
        self.game
    }

    /// Everyone admitted at preparation time.
    pub fn participants(&self) -> &[PlayerId] {
        self.session.participants()
    }

    /// Participants still in the game.
    pub fn present(&self) -> Vec<PlayerId> {
        self.session.present()
    }

    pub fn present_count(&self) -> usize {
        self.session.present_count()
    }

    pub fn environment(&self) -> Option<&dyn SessionEnvironment> {
        self.session.environment().map(|env| env.as_ref())
    }

    /// Ticks since the game entered STARTED (0 inside `on_start`).
    pub fn ticks_played(&self) -> u64 {
        self.ticks_played
    }

    pub fn ticks_per_second(&self) -> u32 {
        self.ticks_per_second
    }

    /// Whole seconds since the game entered STARTED.
    pub fn seconds_played(&self) -> u64 {
        self.ticks_played / u64::from(self.ticks_per_second)
    }

    /// `true` on the tick that completes each `secs`-second stretch of
    /// play, whatever the tick rate.
    pub fn every_secs(&self, secs: u64) -> bool {
        let period = secs.saturating_mul(u64::from(self.ticks_per_second));
        period > 0 && self.ticks_played > 0 && self.ticks_played % period == 0
    }

    /// Sends `notice` to every participant still present.
    pub fn broadcast(&mut self, notice: Notice) {
        let present = self.session.present();
        crate::effect::notify_all(self.effects, &present, notice);
    }

    /// Sends `notice` to one player.
    pub fn tell(&mut self, player: PlayerId, notice: Notice) {
        self.effects.push(Effect::Notify { player, notice });
    }

    /// Moves a player to `location` inside the session environment.
    /// Ignored before the environment exists.
    pub fn relocate(&mut self, player: PlayerId, location: Location) {
        if let Some(env) = self.session.environment() {
            self.effects.push(Effect::Relocate {
                player,
                destination: Destination::Environment {
                    world: env.name().to_owned(),
                    location,
                },
            });
        }
    }
}

/// Returned by [`VariantBehavior::on_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantOutcome {
    Continue,
    /// The game is over; the registry tears the session down.
    Finished,
}

// ---------------------------------------------------------------------------
// VariantBehavior
// ---------------------------------------------------------------------------

/// Per-variant rules. One boxed value lives inside each game definition
/// and is reused across sessions, so `on_start` should reset any state.
///
/// Game-mode and inventory resets are the variant's business; the host
/// usually does them in response to the notices the hooks broadcast.
pub trait VariantBehavior: Send + fmt::Debug + 'static {
    /// Where a participant spawns when the multi-point rule doesn't apply
    /// (no spawn points, or more participants than points).
    fn spawn_location(&self, ctx: &SpawnContext<'_>) -> Location {
        default_spawn_location(ctx)
    }

    /// Called once, right after participants were relocated into the
    /// environment.
    fn on_start(&mut self, _ctx: &mut PlayContext<'_>) {}

    /// Called every tick while STARTED. Default: the game is over once no
    /// participant is left.
    fn on_tick(&mut self, ctx: &mut PlayContext<'_>) -> VariantOutcome {
        if ctx.present_count() == 0 {
            VariantOutcome::Finished
        } else {
            VariantOutcome::Continue
        }
    }

    /// Called when a participant quits or is eliminated during play.
    /// `player` is already gone from `ctx.present()`.
    fn on_player_out(&mut self, _ctx: &mut PlayContext<'_>, _player: PlayerId) {}

    /// Called once when the session ends, before players are sent back.
    fn on_end(&mut self, _ctx: &mut PlayContext<'_>) {}
}

// ---------------------------------------------------------------------------
// Built-in variants
// ---------------------------------------------------------------------------

/// Last player standing. Ends as soon as at most one participant remains
/// and names the survivor.
#[derive(Debug, Default)]
pub struct Deathmatch;

impl VariantBehavior for Deathmatch {
    fn on_tick(&mut self, ctx: &mut PlayContext<'_>) -> VariantOutcome {
        let present = ctx.present();
        match present.as_slice() {
            [] => VariantOutcome::Finished,
            [winner] => {
                let notice = Notice::Winner {
                    game: ctx.game().to_owned(),
                    player: *winner,
                };
                ctx.broadcast(notice);
                VariantOutcome::Finished
            }
            _ => VariantOutcome::Continue,
        }
    }

    fn on_player_out(&mut self, ctx: &mut PlayContext<'_>, player: PlayerId) {
        let notice = Notice::PlayerOut {
            game: ctx.game().to_owned(),
            player,
            remaining: ctx.present_count(),
        };
        ctx.broadcast(notice);
    }
}

/// Seconds between two waves.
pub const WAVE_INTERVAL_SECS: u64 = 30;

/// Cooperative survival. Announces a new wave every
/// [`WAVE_INTERVAL_SECS`]; spawning the monsters is left to the host,
/// which reacts to [`Notice::WaveStarted`].
#[derive(Debug, Default)]
pub struct Waves {
    wave: u32,
}

impl Waves {
    pub fn wave(&self) -> u32 {
        self.wave
    }

    fn announce(&self, ctx: &mut PlayContext<'_>) {
        let notice = Notice::WaveStarted {
            game: ctx.game().to_owned(),
            wave: self.wave,
        };
        ctx.broadcast(notice);
    }
}

impl VariantBehavior for Waves {
    /// Everyone starts together on the ground at the environment's spawn,
    /// regardless of configured points.
    fn spawn_location(&self, ctx: &SpawnContext<'_>) -> Location {
        let spawn = ctx.environment.default_spawn_point();
        spawn.with_y(ctx.environment.ground_level_at(spawn.x, spawn.z))
    }

    fn on_start(&mut self, ctx: &mut PlayContext<'_>) {
        self.wave = 1;
        self.announce(ctx);
    }

    fn on_tick(&mut self, ctx: &mut PlayContext<'_>) -> VariantOutcome {
        if ctx.present_count() == 0 {
            return VariantOutcome::Finished;
        }
        if ctx.every_secs(WAVE_INTERVAL_SECS) {
            self.wave += 1;
            self.announce(ctx);
        }
        VariantOutcome::Continue
    }
}

// ---------------------------------------------------------------------------
// VariantCatalog
// ---------------------------------------------------------------------------

type VariantFactory = Box<dyn Fn() -> Box<dyn VariantBehavior> + Send + Sync>;

/// Builds the behavior for each [`VariantType`].
///
/// The default catalog maps every type to its built-in variant. Hosts with
/// their own rules (or tests that want to observe hooks) register a
/// replacement factory.
pub struct VariantCatalog {
    factories: HashMap<VariantType, VariantFactory>,
}

impl VariantCatalog {
    /// A catalog with no factories; `build` falls back to the built-ins.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Replaces the factory for `variant_type`.
    pub fn register<F>(&mut self, variant_type: VariantType, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn VariantBehavior> + Send + Sync + 'static,
    {
        self.factories.insert(variant_type, Box::new(factory));
        self
    }

    pub fn build(&self, variant_type: VariantType) -> Box<dyn VariantBehavior> {
        match self.factories.get(&variant_type) {
            Some(factory) => factory(),
            None => builtin(variant_type),
        }
    }
}

impl Default for VariantCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        for ty in VariantType::ALL {
            catalog.register(ty, move || builtin(ty));
        }
        catalog
    }
}

impl fmt::Debug for VariantCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantCatalog")
            .field("registered", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn builtin(variant_type: VariantType) -> Box<dyn VariantBehavior> {
    match variant_type {
        VariantType::Deathmatch => Box::new(Deathmatch),
        VariantType::Waves => Box::new(Waves::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_session::{SessionId, StaticEnvironment};
    use std::sync::Arc;

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn env() -> StaticEnvironment {
        StaticEnvironment {
            name: "pit-01".into(),
            spawn: Location::new(5.0, 100.0, 5.0),
            ground_level: 64.0,
        }
    }

    fn running_session(players: &[u64]) -> ActiveSession {
        let mut session = ActiveSession::with_id(
            SessionId::from("01"),
            "pit",
            players.iter().copied().map(pid).collect(),
        );
        session.attach(Arc::new(env()));
        session
    }

    #[test]
    fn test_variant_type_parse_case_insensitive() {
        assert_eq!("DeathMatch".parse::<VariantType>().unwrap(), VariantType::Deathmatch);
        assert_eq!(" waves ".parse::<VariantType>().unwrap(), VariantType::Waves);
        assert!(matches!(
            "spleef".parse::<VariantType>(),
            Err(GameError::InvalidType(t)) if t == "spleef"
        ));
    }

    #[test]
    fn test_default_spawn_location_prefers_first_point() {
        let env = env();
        let mut points = BTreeMap::new();
        points.insert(4, Location::new(4.0, 65.0, 4.0));
        points.insert(2, Location::new(2.0, 65.0, 2.0));
        let ctx = SpawnContext {
            spawn_points: &points,
            environment: &env,
        };
        assert_eq!(default_spawn_location(&ctx), Location::new(2.0, 65.0, 2.0));
    }

    #[test]
    fn test_default_spawn_location_falls_back_to_environment() {
        let env = env();
        let points = BTreeMap::new();
        let ctx = SpawnContext {
            spawn_points: &points,
            environment: &env,
        };
        assert_eq!(default_spawn_location(&ctx), env.spawn);
    }

    #[test]
    fn test_waves_spawns_on_ground() {
        let env = env();
        let points = BTreeMap::new();
        let ctx = SpawnContext {
            spawn_points: &points,
            environment: &env,
        };
        assert_eq!(Waves::default().spawn_location(&ctx), Location::new(5.0, 64.0, 5.0));
    }

    #[test]
    fn test_deathmatch_continues_with_two_finishes_with_one() {
        let mut session = running_session(&[1, 2]);
        let mut effects = Vec::new();
        let mut dm = Deathmatch;

        let mut ctx = PlayContext::new("Pit", &session, &mut effects, 1);
        assert_eq!(dm.on_tick(&mut ctx), VariantOutcome::Continue);
        assert!(effects.is_empty());

        session.remove(pid(1));
        let mut ctx = PlayContext::new("Pit", &session, &mut effects, 2);
        assert_eq!(dm.on_tick(&mut ctx), VariantOutcome::Finished);
        assert!(matches!(
            &effects[..],
            [Effect::Notify { player, notice: Notice::Winner { player: w, .. } }]
                if *player == pid(2) && *w == pid(2)
        ));
    }

    #[test]
    fn test_waves_announces_on_interval_and_ends_when_empty() {
        let mut session = running_session(&[1]);
        let mut effects = Vec::new();
        let mut waves = Waves::default();

        waves.on_start(&mut PlayContext::new("Pit", &session, &mut effects, 0));
        assert_eq!(waves.wave(), 1);

        for tick in 1..=WAVE_INTERVAL_SECS {
            let mut ctx = PlayContext::new("Pit", &session, &mut effects, tick);
            assert_eq!(waves.on_tick(&mut ctx), VariantOutcome::Continue);
        }
        assert_eq!(waves.wave(), 2);
        assert_eq!(effects.len(), 2);

        session.remove(pid(1));
        let mut ctx = PlayContext::new("Pit", &session, &mut effects, 31);
        assert_eq!(waves.on_tick(&mut ctx), VariantOutcome::Finished);
    }

    #[test]
    fn test_waves_interval_follows_tick_rate() {
        let session = running_session(&[1]);
        let mut effects = Vec::new();
        let mut waves = Waves::default();
        waves.on_start(&mut PlayContext::new("Pit", &session, &mut effects, 0).with_tick_rate(4));

        for tick in 1..WAVE_INTERVAL_SECS * 4 {
            let mut ctx = PlayContext::new("Pit", &session, &mut effects, tick).with_tick_rate(4);
            assert_eq!(waves.on_tick(&mut ctx), VariantOutcome::Continue);
        }
        assert_eq!(waves.wave(), 1);

        let mut ctx =
            PlayContext::new("Pit", &session, &mut effects, WAVE_INTERVAL_SECS * 4).with_tick_rate(4);
        assert_eq!(ctx.seconds_played(), WAVE_INTERVAL_SECS);
        assert_eq!(waves.on_tick(&mut ctx), VariantOutcome::Continue);
        assert_eq!(waves.wave(), 2);
    }

    #[test]
    fn test_play_context_relocate_targets_environment() {
        let session = running_session(&[1]);
        let mut effects = Vec::new();
        let mut ctx = PlayContext::new("Pit", &session, &mut effects, 0);
        ctx.relocate(pid(1), Location::new(1.0, 2.0, 3.0));

        assert!(matches!(
            &effects[..],
            [Effect::Relocate { destination: Destination::Environment { world, .. }, .. }]
                if world == "pit-01"
        ));
    }

    #[test]
    fn test_catalog_register_overrides_builtin() {
        #[derive(Debug)]
        struct Never;
        impl VariantBehavior for Never {
            fn on_tick(&mut self, _ctx: &mut PlayContext<'_>) -> VariantOutcome {
                VariantOutcome::Continue
            }
        }

        let mut catalog = VariantCatalog::default();
        catalog.register(VariantType::Deathmatch, || Box::new(Never));
        let behavior = catalog.build(VariantType::Deathmatch);
        assert!(format!("{behavior:?}").contains("Never"));
        assert!(format!("{:?}", catalog.build(VariantType::Waves)).contains("Waves"));
    }
}
