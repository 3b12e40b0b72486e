use std::time::Duration;

use parasite_frame::FrameConfig;

/// Default interval between reaper passes.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_millis(500);

/// Default age after which a pending call is reclaimed.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5);

/// Per-connection tuning.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How often the reaper scans the pending-call table. Default: 500 ms.
    pub reap_interval: Duration,
    /// Age at which an unanswered call is reclaimed. Default: 5 s.
    pub stale_after: Duration,
    /// Frame reader and writer limits.
    pub frame: FrameConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reap_interval: DEFAULT_REAP_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
            frame: FrameConfig::default(),
        }
    }
}

/// Host-wide configuration, applied to every loaded plugin.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    pub connection: ConnectionConfig,
}
