//! Configuration types for kvlb

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KvlbConfig {
    /// Discovery configuration
    pub discovery: DiscoveryConfig,
    /// Watch stream reconnect policy
    pub reconnect: ReconnectConfig,
    /// Balancer configuration
    pub balancer: BalancerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Entries preloaded into an in-memory store
    pub seed: Vec<SeedEntry>,
}

impl KvlbConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::KvlbError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::KvlbError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::KvlbError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Key-value store discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Dial timeout in seconds
    pub dial_timeout_secs: u64,
    /// Resolver scheme, also the first segment of the key namespace
    pub scheme: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            dial_timeout_secs: 5,
            scheme: "grpc-lb-custom".to_string(),
        }
    }
}

impl DiscoveryConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }
}

/// Reconnect policy applied when a watch stream is lost
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Re-bootstrap and resubscribe after stream loss
    pub enabled: bool,
    /// Delay before the first attempt in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound on the delay in milliseconds
    pub max_backoff_ms: u64,
    /// Growth factor between attempts
    pub multiplier: u32,
    /// Consecutive failed attempts before giving up (unbounded if unset)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            multiplier: 2,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Reconnect disabled: stream loss ends the watch loop
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before the given zero-based attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(attempt);
        let delay = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    /// Whether another attempt is allowed after `failures` consecutive failures
    pub fn allows(&self, failures: u32) -> bool {
        self.enabled && self.max_attempts.map_or(true, |max| failures < max)
    }
}

/// Balancer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Selection policy
    pub policy: BalancePolicy,
}

/// Per-call selection policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BalancePolicy {
    /// Smooth weighted round-robin
    #[default]
    Weighted,
    /// Plain round-robin, weights ignored
    RoundRobin,
}

impl std::fmt::Display for BalancePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalancePolicy::Weighted => write!(f, "weighted"),
            BalancePolicy::RoundRobin => write!(f, "round-robin"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (e.g., "info", "kvlb_network=debug")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// A key/value pair to preload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedEntry {
    pub key: String,
    #[serde(default)]
    pub value: String,
}
