//! Coordinator configuration types and defaults.
//!
//! This module contains the runtime configuration consumed by
//! [`RaidCoordinator`](crate::RaidCoordinator). The host binary maps its TOML
//! file onto this structure.

use crate::error::ConfigError;
use crate::insurance::ForfeiturePolicy;
use std::time::Duration;

/// Default period between two heartbeat sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Default age after which a worker without a heartbeat is evicted.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(6);

/// Configuration structure for the raid coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// How often the background sweeper checks worker liveness
    pub sweep_interval: Duration,

    /// Workers whose last heartbeat is older than this are evicted
    pub heartbeat_timeout: Duration,

    /// Which insured items are removed from a player's ledger at match end
    pub forfeiture_policy: ForfeiturePolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            forfeiture_policy: ForfeiturePolicy::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Checks the durations are usable by the sweeper.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("sweep_interval"));
        }
        if self.heartbeat_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("heartbeat_timeout"));
        }
        Ok(())
    }
}
