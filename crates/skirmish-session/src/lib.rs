//! Session environments for Skirmish.
//!
//! A running game gets its own disposable copy of a map template. This
//! crate defines that contract:
//!
//! 1. **Provisioning**: the host's [`Provisioner`] creates and destroys
//!    environments named `<mapTemplate>-<sessionId>`.
//! 2. **Ownership**: an [`ActiveSession`] is held by exactly one game
//!    definition; it records the fixed participant list and, once ready,
//!    the [`SessionEnvironment`] handle.
//! 3. **Deferred teardown**: ended sessions go through a
//!    [`TeardownQueue`] and are destroyed on the following tick.
//!
//! ```text
//! Game layer (above)  ← owns ActiveSession, pushes Teardowns
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Host (below)        ← implements Provisioner / SessionEnvironment
//! ```

mod environment;
mod error;
mod provisioner;
mod teardown;

pub use environment::{
    ActiveSession, SessionEnvironment, SessionId, StaticEnvironment, environment_name,
};
pub use error::SessionError;
pub use provisioner::Provisioner;
pub use teardown::{Teardown, TeardownQueue};
