//! The orchestrator actor and the handle hosts use to talk to it.
//!
//! One Tokio task owns the [`GameRegistry`] and the tick scheduler. Every
//! operation reaches it as a [`Command`] over a bounded channel with a
//! `oneshot` reply, so registry state is only ever touched from that task.
//! Provisioning and destruction run in task sets the actor polls alongside
//! its mailbox; saving runs in a writer task. Shutdown ends every session
//! and waits for the environments to be destroyed.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use skirmish_game::{
    DefinitionInfo, DefinitionRecord, Effect, GameError, GameRegistry, SpawnConfig, VariantCatalog,
};
use skirmish_protocol::{Location, PlayerId};
use skirmish_session::{Provisioner, SessionEnvironment, SessionError, SessionId, Teardown};
use skirmish_tick::TickScheduler;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;

use crate::{DefinitionStore, OrchestratorConfig, PlayerGateway, SkirmishError};

type Reply<T> = oneshot::Sender<Result<T, GameError>>;

/// What a provisioning task hands back: game, session and the outcome.
type Provisioned = (
    String,
    SessionId,
    Result<Arc<dyn SessionEnvironment>, SessionError>,
);

/// How long shutdown waits on provisioner calls that are still running.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Requests handled by the orchestrator task.
pub(crate) enum Command {
    Create {
        name: String,
        variant_type: String,
        min_players: usize,
        map_template: String,
        reply: Reply<DefinitionInfo>,
    },
    Enable {
        name: String,
        reply: Reply<()>,
    },
    SetQueueEnabled {
        name: String,
        enabled: bool,
        reply: Reply<()>,
    },
    Edit {
        operator: PlayerId,
        name: String,
        reply: Reply<()>,
    },
    SetSpawn {
        operator: PlayerId,
        index: u32,
        location: Location,
        reply: Reply<()>,
    },
    SetLobby {
        operator: PlayerId,
        location: Location,
        reply: Reply<()>,
    },
    Staged {
        operator: PlayerId,
        reply: Reply<SpawnConfig>,
    },
    Save {
        operator: PlayerId,
        reply: Reply<DefinitionInfo>,
    },
    Exit {
        operator: PlayerId,
        reply: Reply<()>,
    },
    Start {
        name: String,
        reply: Reply<()>,
    },
    Stop {
        name: String,
        reply: Reply<()>,
    },
    Join {
        player: PlayerId,
        name: String,
        reply: Reply<()>,
    },
    Leave {
        player: PlayerId,
        reply: Reply<()>,
    },
    PlayerLeft {
        player: PlayerId,
        reply: Reply<()>,
    },
    CurrentGame {
        player: PlayerId,
        reply: oneshot::Sender<Option<String>>,
    },
    Info {
        name: String,
        reply: Reply<DefinitionInfo>,
    },
    List {
        reply: oneshot::Sender<Vec<DefinitionInfo>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Entry point: `Orchestrator::builder()...spawn(provisioner, gateway, store)`.
pub struct Orchestrator;

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }
}

/// Configures and starts the orchestrator task.
///
/// # Example
///
/// ```rust,ignore
/// use skirmish::prelude::*;
///
/// let handle = Orchestrator::builder()
///     .countdown_secs(10)
///     .spawn(my_provisioner, my_gateway, JsonFileStore::new("games.json"))
///     .await?;
/// handle.create("Pit", "deathmatch", 2, "pit_template").await?;
/// ```
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    catalog: VariantCatalog,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            catalog: VariantCatalog::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tick_rate_hz(mut self, hz: u32) -> Self {
        self.config.tick_rate_hz = hz;
        self
    }

    pub fn countdown_secs(mut self, secs: u32) -> Self {
        self.config.countdown_secs = secs;
        self
    }

    pub fn preparation_secs(mut self, secs: u32) -> Self {
        self.config.preparation_secs = secs;
        self
    }

    pub fn admission_policy(mut self, policy: skirmish_game::AdmissionPolicy) -> Self {
        self.config.admission_policy = policy;
        self
    }

    pub fn provision_timeout_secs(mut self, secs: u32) -> Self {
        self.config.provision_timeout_secs = secs;
        self
    }

    pub fn channel_size(mut self, size: usize) -> Self {
        self.config.channel_size = size;
        self
    }

    /// Variant behaviors to build definitions with. Defaults to the
    /// built-in variants.
    pub fn catalog(mut self, catalog: VariantCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Loads stored definitions and spawns the orchestrator task.
    ///
    /// # Errors
    /// [`SkirmishError::Store`] if the store can't be read. Nothing is
    /// spawned in that case.
    pub async fn spawn<P, G, S>(
        self,
        provisioner: P,
        gateway: G,
        store: S,
    ) -> Result<OrchestratorHandle, SkirmishError>
    where
        P: Provisioner,
        G: PlayerGateway,
        S: DefinitionStore,
    {
        let records = store.load_all().await?;
        let registry =
            GameRegistry::from_records(self.config.registry_config(), self.catalog, records);

        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(persist_loop(store, persist_rx));

        let (tx, rx) = mpsc::channel(self.config.channel_size.max(1));
        let actor = OrchestratorActor {
            registry,
            scheduler: TickScheduler::new(self.config.tick_config()),
            provisioner: Arc::new(provisioner),
            gateway,
            provisioning: JoinSet::new(),
            destroys: JoinSet::new(),
            commands: rx,
            persist_tx,
            writer,
        };
        tokio::spawn(actor.run());

        Ok(OrchestratorHandle { sender: tx })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cheap-to-clone handle to a running orchestrator.
///
/// Every method waits for the orchestrator to process the request. Once
/// the task has stopped they all return [`SkirmishError::Unavailable`].
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    sender: mpsc::Sender<Command>,
}

impl OrchestratorHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SkirmishError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| SkirmishError::Unavailable)?;
        reply_rx.await.map_err(|_| SkirmishError::Unavailable)
    }

    /// Registers a new definition (DISABLED).
    pub async fn create(
        &self,
        name: &str,
        variant_type: &str,
        min_players: usize,
        map_template: &str,
    ) -> Result<DefinitionInfo, SkirmishError> {
        Ok(self
            .request(|reply| Command::Create {
                name: name.to_owned(),
                variant_type: variant_type.to_owned(),
                min_players,
                map_template: map_template.to_owned(),
                reply,
            })
            .await??)
    }

    pub async fn enable(&self, name: &str) -> Result<(), SkirmishError> {
        Ok(self
            .request(|reply| Command::Enable {
                name: name.to_owned(),
                reply,
            })
            .await??)
    }

    pub async fn set_queue_enabled(&self, name: &str, enabled: bool) -> Result<(), SkirmishError> {
        Ok(self
            .request(|reply| Command::SetQueueEnabled {
                name: name.to_owned(),
                enabled,
                reply,
            })
            .await??)
    }

    /// Enters edit mode on `name` for `operator`.
    pub async fn edit(&self, operator: PlayerId, name: &str) -> Result<(), SkirmishError> {
        Ok(self
            .request(|reply| Command::Edit {
                operator,
                name: name.to_owned(),
                reply,
            })
            .await??)
    }

    pub async fn set_spawn(
        &self,
        operator: PlayerId,
        index: u32,
        location: Location,
    ) -> Result<(), SkirmishError> {
        Ok(self
            .request(|reply| Command::SetSpawn {
                operator,
                index,
                location,
                reply,
            })
            .await??)
    }

    pub async fn set_lobby(
        &self,
        operator: PlayerId,
        location: Location,
    ) -> Result<(), SkirmishError> {
        Ok(self
            .request(|reply| Command::SetLobby {
                operator,
                location,
                reply,
            })
            .await??)
    }

    /// The operator's staged (uncommitted) spawn configuration.
    pub async fn staged(&self, operator: PlayerId) -> Result<SpawnConfig, SkirmishError> {
        Ok(self
            .request(|reply| Command::Staged { operator, reply })
            .await??)
    }

    /// Commits the staged configuration and leaves edit mode.
    pub async fn save(&self, operator: PlayerId) -> Result<DefinitionInfo, SkirmishError> {
        Ok(self
            .request(|reply| Command::Save { operator, reply })
            .await??)
    }

    /// Discards the staged configuration and leaves edit mode.
    pub async fn exit(&self, operator: PlayerId) -> Result<(), SkirmishError> {
        Ok(self
            .request(|reply| Command::Exit { operator, reply })
            .await??)
    }

    pub async fn start(&self, name: &str) -> Result<(), SkirmishError> {
        Ok(self
            .request(|reply| Command::Start {
                name: name.to_owned(),
                reply,
            })
            .await??)
    }

    pub async fn stop(&self, name: &str) -> Result<(), SkirmishError> {
        Ok(self
            .request(|reply| Command::Stop {
                name: name.to_owned(),
                reply,
            })
            .await??)
    }

    pub async fn join(&self, player: PlayerId, name: &str) -> Result<(), SkirmishError> {
        Ok(self
            .request(|reply| Command::Join {
                player,
                name: name.to_owned(),
                reply,
            })
            .await??)
    }

    pub async fn leave(&self, player: PlayerId) -> Result<(), SkirmishError> {
        Ok(self
            .request(|reply| Command::Leave { player, reply })
            .await??)
    }

    /// Reports that a player quit or was eliminated.
    pub async fn player_left(&self, player: PlayerId) -> Result<(), SkirmishError> {
        Ok(self
            .request(|reply| Command::PlayerLeft { player, reply })
            .await??)
    }

    pub async fn current_game(&self, player: PlayerId) -> Result<Option<String>, SkirmishError> {
        self.request(|reply| Command::CurrentGame { player, reply })
            .await
    }

    pub async fn info(&self, name: &str) -> Result<DefinitionInfo, SkirmishError> {
        Ok(self
            .request(|reply| Command::Info {
                name: name.to_owned(),
                reply,
            })
            .await??)
    }

    pub async fn list(&self) -> Result<Vec<DefinitionInfo>, SkirmishError> {
        self.request(|reply| Command::List { reply }).await
    }

    /// Stops the orchestrator. Running sessions end, their environments are
    /// destroyed and pending saves are written before this returns.
    pub async fn shutdown(&self) -> Result<(), SkirmishError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Returns `true` once the orchestrator task has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct OrchestratorActor<P, G> {
    registry: GameRegistry,
    scheduler: TickScheduler,
    provisioner: Arc<P>,
    gateway: G,
    provisioning: JoinSet<Provisioned>,
    destroys: JoinSet<()>,
    commands: mpsc::Receiver<Command>,
    persist_tx: mpsc::UnboundedSender<DefinitionRecord>,
    writer: JoinHandle<()>,
}

impl<P: Provisioner, G: PlayerGateway> OrchestratorActor<P, G> {
    async fn run(mut self) {
        tracing::info!(
            definitions = self.registry.list().len(),
            tick_rate_hz = self.scheduler.tick_rate_hz(),
            "orchestrator started"
        );

        let shutdown = loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        break None;
                    };
                    if let ControlFlow::Break(reply) = self.handle(cmd) {
                        break Some(reply);
                    }
                }
                Some(joined) = self.provisioning.join_next(), if !self.provisioning.is_empty() => {
                    self.provisioned(joined);
                }
                Some(joined) = self.destroys.join_next(), if !self.destroys.is_empty() => {
                    if let Err(err) = joined {
                        tracing::error!(error = %err, "destroy task failed");
                    }
                }
                info = self.scheduler.wait_for_tick() => {
                    tracing::trace!(tick = info.tick, "tick");
                    self.registry.tick();
                    self.flush();
                    self.scheduler.record_tick_end();
                }
            }
        };

        self.wind_down().await;

        // Refuse new commands, then let queued saves finish before
        // reporting the shutdown.
        let ticks = self.scheduler.tick_count();
        let Self {
            commands,
            persist_tx,
            writer,
            ..
        } = self;
        drop(commands);
        drop(persist_tx);
        if let Err(err) = writer.await {
            tracing::error!(error = %err, "definition writer failed");
        }
        tracing::info!(ticks, "orchestrator stopped");
        if let Some(reply) = shutdown {
            let _ = reply.send(());
        }
    }

    fn handle(&mut self, cmd: Command) -> ControlFlow<oneshot::Sender<()>> {
        let registry = &mut self.registry;
        match cmd {
            Command::Create {
                name,
                variant_type,
                min_players,
                map_template,
                reply,
            } => {
                let result =
                    registry.create_definition(&name, &variant_type, min_players, &map_template);
                let _ = reply.send(result);
            }
            Command::Enable { name, reply } => {
                let _ = reply.send(registry.enable(&name));
            }
            Command::SetQueueEnabled {
                name,
                enabled,
                reply,
            } => {
                let _ = reply.send(registry.set_queue_enabled(&name, enabled));
            }
            Command::Edit {
                operator,
                name,
                reply,
            } => {
                let _ = reply.send(registry.enter_edit_mode(operator, &name));
            }
            Command::SetSpawn {
                operator,
                index,
                location,
                reply,
            } => {
                let _ = reply.send(registry.set_staged_spawn_point(operator, index, location));
            }
            Command::SetLobby {
                operator,
                location,
                reply,
            } => {
                let _ = reply.send(registry.set_staged_lobby(operator, location));
            }
            Command::Staged { operator, reply } => {
                let _ = reply.send(registry.staged_config(operator).cloned());
            }
            Command::Save { operator, reply } => {
                let _ = reply.send(registry.save_and_exit(operator));
            }
            Command::Exit { operator, reply } => {
                let _ = reply.send(registry.discard_and_exit(operator));
            }
            Command::Start { name, reply } => {
                let _ = reply.send(registry.start(&name));
            }
            Command::Stop { name, reply } => {
                let _ = reply.send(registry.stop(&name));
            }
            Command::Join {
                player,
                name,
                reply,
            } => {
                let _ = reply.send(registry.join_queue(player, &name));
            }
            Command::Leave { player, reply } => {
                let _ = reply.send(registry.leave_queue(player));
            }
            Command::PlayerLeft { player, reply } => {
                let _ = reply.send(registry.player_left(player));
            }
            Command::CurrentGame { player, reply } => {
                let _ = reply.send(registry.player_current_game(player));
            }
            Command::Info { name, reply } => {
                let _ = reply.send(registry.info(&name));
            }
            Command::List { reply } => {
                let _ = reply.send(registry.list());
            }
            Command::Shutdown { reply } => {
                tracing::info!("orchestrator shutting down");
                return ControlFlow::Break(reply);
            }
        }
        self.flush();
        ControlFlow::Continue(())
    }

    fn provisioned(&mut self, joined: Result<Provisioned, JoinError>) {
        match joined {
            Ok((game, session_id, result)) => {
                self.registry.on_provisioned(&game, &session_id, result);
                self.flush();
            }
            Err(err) => tracing::error!(error = %err, "provisioning task failed"),
        }
    }

    /// Ends every session and waits for its environment to be destroyed.
    ///
    /// Provisioner calls still in flight get [`SHUTDOWN_GRACE`] to finish so
    /// the environments they produce are destroyed too.
    async fn wind_down(&mut self) {
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while !self.provisioning.is_empty() {
            match tokio::time::timeout_at(deadline, self.provisioning.join_next()).await {
                Ok(Some(joined)) => self.provisioned(joined),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        pending = self.provisioning.len(),
                        "provisioning still running at shutdown, abandoned"
                    );
                    self.provisioning.abort_all();
                    break;
                }
            }
        }

        self.registry.shutdown();
        self.flush();

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while !self.destroys.is_empty() {
            match tokio::time::timeout_at(deadline, self.destroys.join_next()).await {
                Ok(Some(Ok(()))) => {}
                Ok(Some(Err(err))) => tracing::error!(error = %err, "destroy task failed"),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        pending = self.destroys.len(),
                        "environments still being destroyed at shutdown"
                    );
                    break;
                }
            }
        }
    }

    /// Carries out everything the registry asked for.
    fn flush(&mut self) {
        for effect in self.registry.take_effects() {
            match effect {
                Effect::Persist(record) => {
                    if self.persist_tx.send(record).is_err() {
                        tracing::error!("definition writer is gone, record not saved");
                    }
                }
                Effect::Provision {
                    game,
                    map_template,
                    session_id,
                } => self.provision(game, map_template, session_id),
                Effect::Destroy(teardown) => self.destroy(teardown),
                Effect::Relocate {
                    player,
                    destination,
                } => self.gateway.relocate(player, &destination),
                Effect::LockMovement { player, locked } => {
                    self.gateway.set_movement_locked(player, locked);
                }
                Effect::Notify { player, notice } => self.gateway.notify(player, &notice),
            }
        }
    }

    fn provision(&mut self, game: String, map_template: String, session_id: SessionId) {
        let provisioner = Arc::clone(&self.provisioner);
        self.provisioning.spawn(async move {
            let result = provisioner.provision(&map_template, &session_id).await;
            (game, session_id, result)
        });
    }

    fn destroy(&mut self, teardown: Teardown) {
        let provisioner = Arc::clone(&self.provisioner);
        self.destroys.spawn(async move {
            let environment = teardown.environment_name();
            match provisioner
                .destroy(&teardown.map_template, &teardown.session_id)
                .await
            {
                Ok(()) => tracing::info!(%environment, "environment destroyed"),
                Err(err) => tracing::error!(%environment, error = %err, "destroy failed"),
            }
        });
    }
}

/// Writes records one at a time, in the order they were produced.
async fn persist_loop<S: DefinitionStore>(
    store: S,
    mut records: mpsc::UnboundedReceiver<DefinitionRecord>,
) {
    while let Some(record) = records.recv().await {
        if let Err(err) = store.save(&record).await {
            tracing::error!(game = %record.name, error = %err, "failed to save definition");
        }
    }
}
