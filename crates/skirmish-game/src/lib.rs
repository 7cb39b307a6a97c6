//! Game definitions and their lifecycle for Skirmish.
//!
//! Everything here is synchronous and free of I/O. The [`GameRegistry`]
//! owns every definition and is driven by two inputs: operations (create,
//! join, start, ...) and [`GameRegistry::tick`]. What it needs done in the
//! outside world comes out as [`Effect`]s.
//!
//! # Key types
//!
//! - [`GameRegistry`]: all definitions, queues, edit locks and timers
//! - [`GameDefinition`]: one named game and its [`GameState`]
//! - [`VariantBehavior`]: the trait a game variant implements
//! - [`Effect`]: side-effect requests for the orchestrator
//! - [`RegistryConfig`]: countdown/preparation lengths and admission policy

mod config;
mod definition;
mod effect;
mod error;
mod registry;
mod variant;

pub use config::{AdmissionPolicy, GameState, PREPARATION_CHECKPOINTS, RegistryConfig};
pub use definition::{DefinitionInfo, DefinitionRecord, GameDefinition, SpawnConfig};
pub use effect::Effect;
pub use error::{ErrorKind, GameError};
pub use registry::{EditSession, GameRegistry};
pub use variant::{
    Deathmatch, PlayContext, SpawnContext, VariantBehavior, VariantCatalog, VariantOutcome,
    VariantType, WAVE_INTERVAL_SECS, Waves, default_spawn_location,
};
