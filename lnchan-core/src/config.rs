use serde_derive::{Deserialize, Serialize};

/// Confirmations before a funding transaction opens the channel
pub const DEFAULT_FUNDING_DEPTH: u32 = 3;

/// Confirmations before a closing transaction is considered final
pub const DEFAULT_SAFETY_DEPTH: u32 = 6;

/// Buffered change events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Chain follower polling interval
pub const DEFAULT_FOLLOWER_INTERVAL_MS: u64 = 60_000;

/// Engine configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Confirmations before FUNDING_PENDING becomes OPEN
    pub funding_depth: u32,
    /// Confirmations before CLOSING_* becomes CLOSED
    pub safety_depth: u32,
    /// Capacity of the change event channel
    pub event_capacity: usize,
    /// Chain follower polling interval
    pub follower_interval_ms: u64,
    /// Remove closed channels after each chain sync
    pub auto_prune: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            funding_depth: DEFAULT_FUNDING_DEPTH,
            safety_depth: DEFAULT_SAFETY_DEPTH,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            follower_interval_ms: DEFAULT_FOLLOWER_INTERVAL_MS,
            auto_prune: true,
        }
    }
}

impl EngineConfig {
    /// Clamp values that would make the engine misbehave
    pub fn sanitized(mut self) -> Self {
        self.funding_depth = self.funding_depth.max(1);
        self.safety_depth = self.safety_depth.max(1);
        self.event_capacity = self.event_capacity.max(1);
        self.follower_interval_ms = self.follower_interval_ms.max(1);
        self
    }
}
