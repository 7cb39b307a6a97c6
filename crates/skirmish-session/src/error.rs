//! Error types for the session-environment layer.

use crate::SessionId;

/// Errors reported by a [`Provisioner`](crate::Provisioner).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The environment could not be created. The game that asked for it
    /// goes back to READY and its participants are told why.
    #[error("provisioning {map_template}-{session_id} failed: {reason}")]
    ProvisionFailed {
        map_template: String,
        session_id: SessionId,
        reason: String,
    },

    /// The environment could not be removed. Logged; nothing else depends
    /// on it once the game has ended.
    #[error("destroying {map_template}-{session_id} failed: {reason}")]
    DestroyFailed {
        map_template: String,
        session_id: SessionId,
        reason: String,
    },
}

impl SessionError {
    pub fn provision_failed(
        map_template: &str,
        session_id: &SessionId,
        reason: impl Into<String>,
    ) -> Self {
        Self::ProvisionFailed {
            map_template: map_template.to_owned(),
            session_id: session_id.clone(),
            reason: reason.into(),
        }
    }

    pub fn destroy_failed(
        map_template: &str,
        session_id: &SessionId,
        reason: impl Into<String>,
    ) -> Self {
        Self::DestroyFailed {
            map_template: map_template.to_owned(),
            session_id: session_id.clone(),
            reason: reason.into(),
        }
    }
}
