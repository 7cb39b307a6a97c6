//! The provisioner hook: how session environments are created and removed.
//!
//! Skirmish doesn't copy worlds itself; that's the host's job (a world
//! manager plugin, a container API, a directory copy). The host implements
//! [`Provisioner`] and the orchestrator calls it from a spawned task, never
//! from the thread that owns game state.

use std::sync::Arc;

use crate::{SessionEnvironment, SessionError, SessionId};

/// Creates and destroys session environments.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → one provisioner is shared by every spawned
///   provisioning task for the life of the orchestrator.
/// - The returned futures are `Send` so they can run on any runtime worker.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use skirmish_session::{
///     Provisioner, SessionEnvironment, SessionError, SessionId, StaticEnvironment,
/// };
///
/// /// Every arena is a flat plane at y = 64.
/// struct FlatProvisioner;
///
/// impl Provisioner for FlatProvisioner {
///     async fn provision(
///         &self,
///         map_template: &str,
///         session_id: &SessionId,
///     ) -> Result<Arc<dyn SessionEnvironment>, SessionError> {
///         Ok(Arc::new(StaticEnvironment::flat(map_template, session_id, 64.0)))
///     }
///
///     async fn destroy(
///         &self,
///         _map_template: &str,
///         _session_id: &SessionId,
///     ) -> Result<(), SessionError> {
///         Ok(())
///     }
/// }
/// ```
pub trait Provisioner: Send + Sync + 'static {
    /// Creates the environment `<map_template>-<session_id>`.
    ///
    /// # Errors
    /// [`SessionError::ProvisionFailed`] if the copy can't be made. The
    /// orchestrator reverts the game to READY and clears its queue.
    fn provision(
        &self,
        map_template: &str,
        session_id: &SessionId,
    ) -> impl std::future::Future<Output = Result<Arc<dyn SessionEnvironment>, SessionError>> + Send;

    /// Destroys a previously provisioned environment.
    ///
    /// Called one tick after the session ended, once no participant can
    /// still be inside it.
    fn destroy(
        &self,
        map_template: &str,
        session_id: &SessionId,
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send;
}
