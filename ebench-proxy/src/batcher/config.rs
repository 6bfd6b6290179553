//! Configuration for the batch coordinator.

use std::time::Duration;

use ebench_core::{ProxyConfig, ReadPreference};

/// Configuration for the batch coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatcherConfig {
    /// Maximum operations per envelope (flush threshold)
    pub batch_size: usize,

    /// Maximum time the oldest pending operation waits before a flush
    pub linger: Duration,

    /// Bound on every store call
    pub rpc_timeout: Duration,

    /// Attached to every read
    pub read_preference: ReadPreference,

    /// Per-item outcomes instead of all-or-nothing envelopes
    pub allow_partial: bool,

    /// Issue every operation on its own, bypassing envelopes
    pub turbo: bool,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

impl From<&ProxyConfig> for BatcherConfig {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            linger: config.batch_linger,
            rpc_timeout: config.rpc_timeout,
            read_preference: config.read_preference,
            allow_partial: config.allow_partial,
            turbo: config.turbo,
        }
    }
}

impl BatcherConfig {
    /// Create config optimized for low latency (no batching)
    pub fn low_latency() -> Self {
        Self { batch_size: 1, linger: Duration::ZERO, turbo: true, ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BatcherConfig::default();
        assert_eq!(config.batch_size, 16);
        assert!(!config.turbo);
        assert!(!config.allow_partial);
    }

    #[test]
    fn test_from_proxy_config() {
        let proxy = ProxyConfig {
            batch_size: 3,
            read_preference: ReadPreference::Nearest,
            allow_partial: true,
            ..Default::default()
        };
        let config = BatcherConfig::from(&proxy);
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.read_preference, ReadPreference::Nearest);
        assert!(config.allow_partial);
        assert_eq!(config.rpc_timeout, proxy.rpc_timeout);
    }

    #[test]
    fn test_low_latency_config() {
        let config = BatcherConfig::low_latency();
        assert!(config.turbo);
        assert_eq!(config.batch_size, 1);
    }
}
