//! Configuration for the storage proxy and the amplifier.
//!
//! Both values are built once at startup (defaults, then `EBENCH_*`
//! environment variables, then command line flags), validated, and never
//! mutated afterwards.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest message the proxy will send (embedded images included)
pub const MAX_SEND_MESSAGE_BYTES: usize = 500 * 1024 * 1024;

/// Largest message the proxy will accept
pub const MAX_RECV_MESSAGE_BYTES: usize = 100 * 1024 * 1024;

/// Upper bound on in-flight requests per pooled connection
pub const CONCURRENCY_FACTOR: usize = 4;

/// Routing / consistency level attached to every read sent to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

impl ReadPreference {
    pub const ALL: [ReadPreference; 5] = [
        ReadPreference::Primary,
        ReadPreference::PrimaryPreferred,
        ReadPreference::Secondary,
        ReadPreference::SecondaryPreferred,
        ReadPreference::Nearest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadPreference::Primary => "primary",
            ReadPreference::PrimaryPreferred => "primaryPreferred",
            ReadPreference::Secondary => "secondary",
            ReadPreference::SecondaryPreferred => "secondaryPreferred",
            ReadPreference::Nearest => "nearest",
        }
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], "");
        ReadPreference::ALL
            .into_iter()
            .find(|p| p.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| ConfigError::UnknownReadPreference(s.to_string()))
    }
}

/// Storage proxy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Address the proxy serves on, and that amplifiers connect to
    pub endpoint: String,

    /// Plaintext transport; when false clients require valid TLS
    pub insecure: bool,

    /// Bound on a single store call (turbo call or batch flush)
    pub rpc_timeout: Duration,

    /// Maximum operations per envelope
    pub batch_size: usize,

    /// Consistency level for every read
    pub read_preference: ReadPreference,

    /// Report per-item outcomes instead of failing the whole envelope
    pub allow_partial: bool,

    /// Bypass batching entirely
    pub turbo: bool,

    /// Maximum time the oldest pending operation waits before a flush
    pub batch_linger: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let rpc_timeout = Duration::from_secs(5);
        Self {
            endpoint: "127.0.0.1:50051".to_string(),
            insecure: true,
            rpc_timeout,
            batch_size: 16,
            read_preference: ReadPreference::Primary,
            allow_partial: false,
            turbo: false,
            batch_linger: rpc_timeout / 10,
        }
    }
}

impl ProxyConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("EBENCH_ENDPOINT") {
            config.endpoint = val;
        }
        if let Some(v) = env_bool("EBENCH_INSECURE") {
            config.insecure = v;
        }
        if let Some(ms) = env_parse::<u64>("EBENCH_RPC_TIMEOUT_MS") {
            config.rpc_timeout = Duration::from_millis(ms);
            config.batch_linger = config.rpc_timeout / 10;
        }
        if let Some(n) = env_parse("EBENCH_BATCH_SIZE") {
            config.batch_size = n;
        }
        if let Some(pref) = env_parse("EBENCH_READ_PREF") {
            config.read_preference = pref;
        }
        if let Some(v) = env_bool("EBENCH_ALLOW_PARTIAL") {
            config.allow_partial = v;
        }
        if let Some(v) = env_bool("EBENCH_TURBO") {
            config.turbo = v;
        }
        if let Some(ms) = env_parse::<u64>("EBENCH_BATCH_LINGER_MS") {
            config.batch_linger = Duration::from_millis(ms);
        }

        config
    }

    /// Reject invalid combinations before anything is started
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }
        if self.batch_size < 1 {
            return Err(ConfigError::TooSmall {
                field: "batch_size",
                min: 1,
                value: self.batch_size as u64,
            });
        }
        if self.rpc_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("rpc_timeout"));
        }
        Ok(())
    }

    /// Validate and return self, for builder-style construction
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }
}

/// Amplifier configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmplifyConfig {
    /// Connection pool size
    pub connections: usize,

    /// Maximum number of in-flight requests (worker count)
    pub concurrency: usize,

    /// Request budget; 0 runs until cancelled
    pub total_requests: u64,

    /// Aggregate request rate; 0 is unthrottled
    pub target_qps: u64,

    /// End-to-end bound on a single request as seen by the caller
    pub per_request_timeout: Duration,

    /// Advisory worker thread count; 0 leaves the runtime default
    pub cpu_affinity_hint: usize,
}

impl Default for AmplifyConfig {
    fn default() -> Self {
        Self {
            connections: 4,
            concurrency: 8,
            total_requests: 1000,
            target_qps: 0,
            per_request_timeout: Duration::from_secs(10),
            cpu_affinity_hint: 0,
        }
    }
}

impl AmplifyConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_parse("EBENCH_CONNECTIONS") {
            config.connections = n;
        }
        if let Some(n) = env_parse("EBENCH_CONCURRENCY") {
            config.concurrency = n;
        }
        if let Some(n) = env_parse("EBENCH_TOTAL_REQUESTS") {
            config.total_requests = n;
        }
        if let Some(n) = env_parse("EBENCH_QPS") {
            config.target_qps = n;
        }
        if let Some(ms) = env_parse::<u64>("EBENCH_TIMEOUT_MS") {
            config.per_request_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse("EBENCH_CPUS") {
            config.cpu_affinity_hint = n;
        }

        config
    }

    /// Reject invalid combinations before anything is started
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connections < 1 {
            return Err(ConfigError::TooSmall {
                field: "connections",
                min: 1,
                value: self.connections as u64,
            });
        }
        if self.concurrency < 1 {
            return Err(ConfigError::TooSmall {
                field: "concurrency",
                min: 1,
                value: self.concurrency as u64,
            });
        }
        if self.concurrency > self.connections.saturating_mul(CONCURRENCY_FACTOR) {
            return Err(ConfigError::ConcurrencyTooHigh {
                concurrency: self.concurrency,
                connections: self.connections,
                factor: CONCURRENCY_FACTOR,
            });
        }
        if self.per_request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("per_request_timeout"));
        }
        Ok(())
    }

    /// Validate and return self, for builder-style construction
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// True when the run stops only on cancellation
    pub fn is_unbounded(&self) -> bool {
        self.total_requests == 0
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs_are_valid() {
        assert!(ProxyConfig::default().validate().is_ok());
        assert!(AmplifyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_linger_is_fraction_of_rpc_timeout() {
        let config = ProxyConfig::default();
        assert!(config.batch_linger < config.rpc_timeout);
        assert!(!config.batch_linger.is_zero());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = ProxyConfig { batch_size: 0, ..Default::default() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooSmall { field: "batch_size", .. })
        ));
    }

    #[test]
    fn test_zero_rpc_timeout_rejected() {
        let config = ProxyConfig { rpc_timeout: Duration::ZERO, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout("rpc_timeout")));
    }

    #[test]
    fn test_zero_connections_rejected() {
        let config = AmplifyConfig { connections: 0, ..Default::default() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooSmall { field: "connections", .. })
        ));
    }

    #[test]
    fn test_concurrency_bounded_by_connections() {
        let ok = AmplifyConfig { connections: 2, concurrency: 8, ..Default::default() };
        assert!(ok.validate().is_ok());

        let too_many = AmplifyConfig { connections: 2, concurrency: 9, ..Default::default() };
        assert_eq!(
            too_many.validate(),
            Err(ConfigError::ConcurrencyTooHigh { concurrency: 9, connections: 2, factor: 4 })
        );
    }

    #[test]
    fn test_huge_connection_count_does_not_overflow() {
        let config = AmplifyConfig {
            connections: usize::MAX,
            concurrency: usize::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = AmplifyConfig { connections: usize::MAX / 2, concurrency: 1, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unbounded_budget() {
        let config = AmplifyConfig { total_requests: 0, ..Default::default() };
        assert!(config.is_unbounded());
        assert!(!AmplifyConfig::default().is_unbounded());
    }

    #[test]
    fn test_read_preference_parsing() {
        assert_eq!("primary".parse::<ReadPreference>().unwrap(), ReadPreference::Primary);
        assert_eq!(
            "secondaryPreferred".parse::<ReadPreference>().unwrap(),
            ReadPreference::SecondaryPreferred
        );
        assert_eq!(
            "PRIMARY_PREFERRED".parse::<ReadPreference>().unwrap(),
            ReadPreference::PrimaryPreferred
        );
        assert_eq!("nearest".parse::<ReadPreference>().unwrap(), ReadPreference::Nearest);
        assert!("closest".parse::<ReadPreference>().is_err());
    }

    #[test]
    fn test_read_preference_serde_uses_camel_case() {
        let json = serde_json::to_string(&ReadPreference::SecondaryPreferred).unwrap();
        assert_eq!(json, "\"secondaryPreferred\"");
        assert_eq!(ReadPreference::SecondaryPreferred.to_string(), "secondaryPreferred");
    }
}
