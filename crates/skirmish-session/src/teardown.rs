//! Deferred destruction of session environments.
//!
//! When a game ends, its session handle is dropped right away but the
//! environment itself is only destroyed on the next tick: by then every
//! relocation issued during teardown has been handed to the host, so no
//! participant is still standing in the world being deleted.

use std::collections::VecDeque;

use crate::{SessionId, environment_name};

/// Everything needed to destroy one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teardown {
    pub map_template: String,
    pub session_id: SessionId,
}

impl Teardown {
    pub fn environment_name(&self) -> String {
        environment_name(&self.map_template, &self.session_id)
    }
}

/// Environments waiting for the next tick to be destroyed.
#[derive(Debug, Default)]
pub struct TeardownQueue {
    pending: VecDeque<Teardown>,
}

impl TeardownQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, teardown: Teardown) {
        tracing::debug!(
            environment = %teardown.environment_name(),
            "environment queued for destruction"
        );
        self.pending.push_back(teardown);
    }

    /// Removes and returns everything queued, oldest first.
    pub fn drain(&mut self) -> Vec<Teardown> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teardown(id: &str) -> Teardown {
        Teardown {
            map_template: "pit".into(),
            session_id: SessionId::from(id),
        }
    }

    #[test]
    fn test_drain_returns_in_push_order_and_empties() {
        let mut q = TeardownQueue::new();
        q.push(teardown("a"));
        q.push(teardown("b"));
        assert_eq!(q.len(), 2);

        let drained = q.drain();
        assert_eq!(drained, vec![teardown("a"), teardown("b")]);
        assert!(q.is_empty());
        assert!(q.drain().is_empty());
    }
}
