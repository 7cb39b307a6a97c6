use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use skirmish::prelude::*;
use skirmish::session::environment_name;
use tokio::sync::{Mutex, mpsc, oneshot};

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// Wave survival with an end: whoever is still standing when the last
/// wave would start wins.
#[derive(Debug)]
struct Holdout {
    waves: skirmish::game::Waves,
    last_wave: u32,
}

impl Holdout {
    fn new(last_wave: u32) -> Self {
        Self {
            waves: skirmish::game::Waves::default(),
            last_wave,
        }
    }
}

impl VariantBehavior for Holdout {
    fn spawn_location(&self, ctx: &SpawnContext<'_>) -> Location {
        self.waves.spawn_location(ctx)
    }

    fn on_start(&mut self, ctx: &mut PlayContext<'_>) {
        self.waves.on_start(ctx);
    }

    fn on_tick(&mut self, ctx: &mut PlayContext<'_>) -> VariantOutcome {
        let next_wave_due = ctx.every_secs(skirmish::game::WAVE_INTERVAL_SECS);
        if next_wave_due && self.waves.wave() >= self.last_wave {
            return VariantOutcome::Finished;
        }
        self.waves.on_tick(ctx)
    }

    fn on_player_out(&mut self, ctx: &mut PlayContext<'_>, player: PlayerId) {
        let notice = Notice::PlayerOut {
            game: ctx.game().to_owned(),
            player,
            remaining: ctx.present_count(),
        };
        ctx.broadcast(notice);
    }

    fn on_end(&mut self, ctx: &mut PlayContext<'_>) {
        for player in ctx.present() {
            let notice = Notice::Winner {
                game: ctx.game().to_owned(),
                player,
            };
            ctx.broadcast(notice);
        }
    }
}

fn catalog(last_wave: u32) -> VariantCatalog {
    let mut catalog = VariantCatalog::default();
    catalog.register(VariantType::Waves, move || Box::new(Holdout::new(last_wave)));
    catalog
}

// ---------------------------------------------------------------------------
// Host side
// ---------------------------------------------------------------------------

/// Environments are flat worlds that only exist in this process.
#[derive(Debug, Default)]
struct ArenaProvisioner {
    live: Mutex<HashSet<String>>,
}

impl Provisioner for ArenaProvisioner {
    async fn provision(
        &self,
        map_template: &str,
        session_id: &SessionId,
    ) -> Result<Arc<dyn SessionEnvironment>, SessionError> {
        let name = environment_name(map_template, session_id);
        if !self.live.lock().await.insert(name.clone()) {
            return Err(SessionError::provision_failed(
                map_template,
                session_id,
                "environment already exists",
            ));
        }
        tracing::info!(environment = %name, "environment copied");
        Ok(Arc::new(StaticEnvironment::flat(map_template, session_id, 64.0)))
    }

    async fn destroy(&self, map_template: &str, session_id: &SessionId) -> Result<(), SessionError> {
        let name = environment_name(map_template, session_id);
        self.live.lock().await.remove(&name);
        tracing::info!(environment = %name, "environment removed");
        Ok(())
    }
}

/// Plays the part of the game server: logs what players would see and
/// eliminates `casualty` when the second wave arrives. Reports the end of
/// the first session on `ended`.
async fn host_loop(
    mut events: mpsc::UnboundedReceiver<GatewayEvent>,
    handle: OrchestratorHandle,
    casualty: PlayerId,
    ended: oneshot::Sender<()>,
) {
    let mut ended = Some(ended);
    while let Some(event) = events.recv().await {
        match event {
            GatewayEvent::Relocate {
                player,
                destination,
            } => tracing::info!(%player, ?destination, "relocate"),
            GatewayEvent::MovementLocked { player, locked } => {
                tracing::debug!(%player, locked, "movement")
            }
            GatewayEvent::Notice { player, notice } => {
                tracing::info!(%player, "{notice}");
                match notice {
                    Notice::WaveStarted { wave: 2, .. } if player == casualty => {
                        if let Err(err) = handle.player_left(casualty).await {
                            tracing::warn!(error = %err, "elimination refused");
                        }
                    }
                    Notice::GameEnded { .. } | Notice::GameStopped { .. } => {
                        if let Some(ended) = ended.take() {
                            let _ = ended.send(());
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

const OPERATOR: PlayerId = PlayerId(100);

/// Fast enough to watch a whole game in a few seconds.
fn demo_config() -> OrchestratorConfig {
    OrchestratorConfig {
        tick_rate_hz: 10,
        countdown_secs: 2,
        preparation_secs: 3,
        ..OrchestratorConfig::default()
    }
}

async fn load_config() -> Result<OrchestratorConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let bytes = tokio::fs::read(&path).await?;
            Ok(serde_json::from_slice(&bytes)?)
        }
        None => Ok(demo_config()),
    }
}

/// Defines the arena with three spawn points and a lobby, then opens it.
async fn set_up_arena(handle: &OrchestratorHandle) -> Result<(), SkirmishError> {
    handle.create("Arena", "waves", 3, "arena").await?;
    handle.edit(OPERATOR, "arena").await?;
    for slot in 1..=3u32 {
        let x = f64::from(slot) * 4.0;
        handle
            .set_spawn(OPERATOR, slot, Location::new(x, 64.0, 0.0))
            .await?;
    }
    handle
        .set_lobby(OPERATOR, Location::new(0.0, 80.0, -20.0))
        .await?;
    handle.save(OPERATOR).await?;
    handle.enable("arena").await
}

async fn run_demo(
    config: OrchestratorConfig,
    last_wave: u32,
) -> Result<Vec<DefinitionInfo>, Box<dyn std::error::Error>> {
    let (gateway, events) = ChannelGateway::new();
    let handle = Orchestrator::builder()
        .config(config)
        .catalog(catalog(last_wave))
        .spawn(ArenaProvisioner::default(), gateway, MemoryStore::new())
        .await?;

    let (ended_tx, ended_rx) = oneshot::channel();
    tokio::spawn(host_loop(events, handle.clone(), PlayerId(3), ended_tx));

    set_up_arena(&handle).await?;
    for id in 1..=3 {
        handle.join(PlayerId(id), "Arena").await?;
    }

    ended_rx.await?;
    while handle.info("Arena").await?.state != GameState::Ready {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let games = handle.list().await?;
    handle.shutdown().await?;
    Ok(games)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = load_config().await?;
    tracing::info!(?config, "starting wave arena");

    for game in run_demo(config, 2).await? {
        println!("{}", serde_json::to_string(&game)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_arena_runs_to_completion() {
        let games = run_demo(demo_config(), 2).await.unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].state, GameState::Ready);
        assert_eq!(games[0].max_players, 3);
        assert!(games[0].has_lobby);
        assert_eq!(games[0].session, None);
    }

    #[tokio::test]
    async fn test_provisioner_refuses_duplicate_environment() {
        let provisioner = ArenaProvisioner::default();
        let id = SessionId::from("fixed");
        provisioner.provision("arena", &id).await.unwrap();
        assert!(provisioner.provision("arena", &id).await.is_err());

        provisioner.destroy("arena", &id).await.unwrap();
        assert!(provisioner.provision("arena", &id).await.is_ok());
    }

    #[test]
    fn test_catalog_builds_holdout_for_waves() {
        let behavior = catalog(3).build(VariantType::Waves);
        assert!(format!("{behavior:?}").starts_with("Holdout"));
    }
}
