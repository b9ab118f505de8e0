use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// Tunables for the monitor. Supplied by the embedding host; there is no
/// config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// How long an observation may wait for its security info.
    pub pending_timeout_ms: u64,
    /// Pending observations kept per tab; the oldest is evicted beyond this.
    pub max_pending_per_tab: usize,
    /// Period of the daemon's expiry sweep.
    pub sweep_interval_ms: u64,
    /// Drop responses served from the browser cache at ingress.
    pub skip_cached: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            pending_timeout_ms: 30_000,
            max_pending_per_tab: 256,
            sweep_interval_ms: 1_000,
            skip_cached: false,
        }
    }
}

impl MonitorConfig {
    pub fn pending_timeout(&self) -> Duration {
        Duration::from_millis(self.pending_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.pending_timeout_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "pending_timeout_ms must be positive".into(),
            ));
        }
        if self.max_pending_per_tab == 0 {
            return Err(CoreError::InvalidConfig(
                "max_pending_per_tab must be positive".into(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "sweep_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
