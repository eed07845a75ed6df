//! Sequencer configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds for delivering a view to one member.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Budget for a single delivery attempt (default: 2s)
    pub attempt_timeout: Duration,
    /// Overall budget from the first attempt before the member is evicted (default: 5s)
    pub delivery_deadline: Duration,
    /// Pause after an attempt that failed without timing out (default: 100ms)
    pub retry_delay: Duration,
    /// Budget for fetching a member's snapshot after it acknowledged (default: 2s)
    pub snapshot_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(2),
            delivery_deadline: Duration::from_secs(5),
            retry_delay: Duration::from_millis(100),
            snapshot_timeout: Duration::from_secs(2),
        }
    }
}

/// Sequencer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Names of the groups this sequencer orders
    pub groups: Vec<String>,
    /// Number of replicas expected to join each group before execution starts (0 disables)
    pub cohort_size: usize,
    /// Delivery bounds
    pub broadcast: BroadcastConfig,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            groups: vec!["default".to_string()],
            cohort_size: 0,
            broadcast: BroadcastConfig::default(),
        }
    }
}
