//! Bus node configuration from defaults or environment variables.

use crate::descriptor::detect_hostname;
use std::env;
use std::time::Duration;

/// Default cap on relays per packet.
pub const DEFAULT_MAX_HOPS: u32 = 64;

/// Default zstd level for gossip snapshots.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Configuration for one bus node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Delay used to coalesce gossip broadcasts. Zero means "after the
    /// commands already queued".
    pub gossip_debounce: Duration,

    /// Packets relayed more often than this are dropped as lost.
    pub max_hops: u32,

    /// Zstd level for topology snapshots (1-22).
    pub compression_level: i32,

    /// Hostname recorded in the node descriptor and used as id prefix.
    pub hostname: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            gossip_debounce: Duration::ZERO,
            max_hops: DEFAULT_MAX_HOPS,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            hostname: detect_hostname(),
        }
    }
}

impl BusConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MESHBUS_GOSSIP_DEBOUNCE_MS`: gossip coalescing delay (default: 0)
    /// - `MESHBUS_MAX_HOPS`: relay cap per packet (default: 64)
    /// - `MESHBUS_COMPRESSION_LEVEL`: zstd level (default: 3)
    /// - `MESHBUS_HOSTNAME`: hostname override (default: `$HOSTNAME` or localhost)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            gossip_debounce: env::var("MESHBUS_GOSSIP_DEBOUNCE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.gossip_debounce),

            max_hops: env::var("MESHBUS_MAX_HOPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_hops),

            compression_level: env::var("MESHBUS_COMPRESSION_LEVEL")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|level| (1..=22).contains(level))
                .unwrap_or(defaults.compression_level),

            hostname: env::var("MESHBUS_HOSTNAME")
                .ok()
                .filter(|h| !h.is_empty())
                .unwrap_or(defaults.hostname),
        }
    }

    /// Fast settings for tests: cheap compression, fixed hostname.
    pub fn for_testing() -> Self {
        Self {
            gossip_debounce: Duration::ZERO,
            max_hops: DEFAULT_MAX_HOPS,
            compression_level: 1,
            hostname: "test".to_string(),
        }
    }

    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    #[must_use]
    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.max_hops = max_hops;
        self
    }
}
