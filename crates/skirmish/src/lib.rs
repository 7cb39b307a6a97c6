//! # Skirmish
//!
//! Lifecycle orchestration for short-lived, instanced mini-games.
//!
//! Operators define games (name, variant, minimum players, map template),
//! players queue for them, and the orchestrator drives each game through
//! countdown, preparation, play and teardown, provisioning a fresh
//! environment per session and destroying it afterwards.
//!
//! The host supplies three collaborators:
//!
//! - a [`Provisioner`] that creates and destroys session environments
//! - a [`PlayerGateway`] that moves, freezes and messages players
//! - a [`DefinitionStore`] that keeps definitions between restarts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use skirmish::prelude::*;
//!
//! let handle = Orchestrator::builder()
//!     .config(config)
//!     .spawn(provisioner, gateway, JsonFileStore::new("games.json"))
//!     .await?;
//!
//! handle.create("Pit", "deathmatch", 2, "pit").await?;
//! handle.enable("Pit").await?;
//! handle.join(PlayerId(1), "pit").await?;
//! ```

mod config;
mod error;
mod gateway;
mod orchestrator;
mod store;

pub use config::OrchestratorConfig;
pub use error::SkirmishError;
pub use gateway::{ChannelGateway, GatewayEvent, PlayerGateway};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorHandle};
pub use store::{DefinitionStore, JsonFileStore, MemoryStore, StoreError};

pub use skirmish_session::Provisioner;

pub use skirmish_game as game;
pub use skirmish_protocol as protocol;
pub use skirmish_session as session;
pub use skirmish_tick as tick;

/// Everything a host usually needs.
pub mod prelude {
    pub use crate::{
        ChannelGateway, DefinitionStore, GatewayEvent, JsonFileStore, MemoryStore, Orchestrator,
        OrchestratorConfig, OrchestratorHandle, PlayerGateway, SkirmishError, StoreError,
    };
    pub use skirmish_game::{
        AdmissionPolicy, DefinitionInfo, DefinitionRecord, ErrorKind, GameError, GameState,
        PlayContext, SpawnConfig, SpawnContext, VariantBehavior, VariantCatalog, VariantOutcome,
        VariantType,
    };
    pub use skirmish_protocol::{Destination, Location, Notice, PlayerId};
    pub use skirmish_session::{
        Provisioner, SessionEnvironment, SessionError, SessionId, StaticEnvironment,
    };
}
