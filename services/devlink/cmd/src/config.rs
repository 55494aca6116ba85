//! Configuration handling for the adapter binary.
//!
//! Settings come from a TOML file with sane defaults; the handful of knobs
//! that matter during development can be overridden on the command line.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Adapter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// TCP listen address for stream channels
    pub tcp_bind: SocketAddr,
    /// UDP listen address for datagram traffic
    pub udp_bind: SocketAddr,
    /// Upper bound for inbound frame bodies (bytes)
    pub max_frame_size: usize,
    /// Seconds a channel may sit unauthenticated; 0 disables the deadline
    pub login_timeout_secs: u64,
    /// Seconds an unanswered correlation entry stays resolvable
    pub correlation_ttl_secs: u64,
    /// Seconds of inactivity before a device partition is dropped
    pub device_idle_ttl_secs: u64,
    /// Device id -> login secret for the built-in secret store
    pub devices: HashMap<String, String>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            tcp_bind: "0.0.0.0:8802".parse().expect("valid default address"),
            udp_bind: "0.0.0.0:8803".parse().expect("valid default address"),
            max_frame_size: 1024 * 1024,
            login_timeout_secs: 30,
            correlation_ttl_secs: 30,
            device_idle_ttl_secs: 3600,
            devices: HashMap::new(),
        }
    }
}

impl AdapterConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("failed to read config file {}", path.as_ref().display())
        })?;
        toml::from_str(&raw).context("invalid adapter config")
    }

    /// Login deadline, or `None` when disabled
    pub fn login_timeout(&self) -> Option<Duration> {
        (self.login_timeout_secs > 0).then(|| Duration::from_secs(self.login_timeout_secs))
    }

    /// TTL for unanswered correlation entries
    pub fn correlation_ttl(&self) -> Duration {
        Duration::from_secs(self.correlation_ttl_secs)
    }

    /// TTL for idle device partitions
    pub fn device_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.device_idle_ttl_secs)
    }
}
