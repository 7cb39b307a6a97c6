//! Orchestrator settings.

use serde::{Deserialize, Serialize};
use skirmish_game::{AdmissionPolicy, RegistryConfig};
use skirmish_tick::TickConfig;

/// Everything an [`Orchestrator`](crate::Orchestrator) can be tuned with.
///
/// Deserializes from partial JSON: missing fields take their defaults, so
/// a host config file only lists what it changes.
///
/// ```rust
/// use skirmish::OrchestratorConfig;
///
/// let config: OrchestratorConfig =
///     serde_json::from_str(r#"{ "countdown_secs": 10 }"#).unwrap();
/// assert_eq!(config.countdown_secs, 10);
/// assert_eq!(config.preparation_secs, 60);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Scheduler rate. Registry timers count ticks, so the durations below
    /// are converted with this rate.
    pub tick_rate_hz: u32,
    /// COUNTDOWN length under [`AdmissionPolicy::Immediate`].
    pub countdown_secs: u32,
    /// PREPARING length.
    pub preparation_secs: u32,
    pub admission_policy: AdmissionPolicy,
    /// Extra time granted to the provisioner after PREPARING runs out.
    /// A game whose environment has not arrived by then returns to READY.
    pub provision_timeout_secs: u32,
    /// Capacity of the command mailbox. Callers wait when it is full.
    pub channel_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 1,
            countdown_secs: 30,
            preparation_secs: 60,
            admission_policy: AdmissionPolicy::default(),
            provision_timeout_secs: 120,
            channel_size: 64,
        }
    }
}

impl OrchestratorConfig {
    /// Scheduler settings, with the rate clamped to the supported range.
    pub fn tick_config(&self) -> TickConfig {
        TickConfig::with_rate(self.tick_rate_hz).validated()
    }

    /// Registry settings, with durations converted from seconds to ticks.
    pub fn registry_config(&self) -> RegistryConfig {
        let rate = self.tick_config().tick_rate_hz;
        RegistryConfig {
            countdown_ticks: self.countdown_secs.saturating_mul(rate),
            preparation_ticks: self.preparation_secs.saturating_mul(rate),
            admission_policy: self.admission_policy,
            ticks_per_second: rate,
            provision_timeout_ticks: self.provision_timeout_secs.saturating_mul(rate),
        }
    }
}
