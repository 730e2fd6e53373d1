//! Page injection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Upper bound for one injection attempt.
    pub inject_timeout_ms: u64,
    /// Retry a rejected injection once with the fallback mode.
    pub fallback_enabled: bool,
    pub bus_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            inject_timeout_ms: 2_000,
            fallback_enabled: true,
            bus_capacity: 64,
        }
    }
}

impl BridgeConfig {
    pub fn inject_timeout(&self) -> Duration {
        Duration::from_millis(self.inject_timeout_ms.max(1))
    }
}
