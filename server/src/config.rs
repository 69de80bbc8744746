//! Node configuration.
//!
//! Loaded from a TOML file. Covers the durable store, both replication
//! planes, the expiry sweeper, the per-source rate limit, and logging.

use cache_store::StoreConfig;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Node configuration loaded from a TOML file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Durable store: file path, open mode, corruption and sync policies.
    pub store: StoreConfig,

    /// Replication planes and peer list.
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Expiry sweeper.
    #[serde(default)]
    pub gc: GcConfig,

    /// Per-source-IP rate limiting.
    #[serde(default)]
    pub rate: RateConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Replication configuration. With no listen address, no multicast group,
/// and no peers, the node runs standalone.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicationConfig {
    /// Shared secret authenticating peer frames. Required whenever any
    /// plane or peer is configured.
    pub secret: Option<String>,

    /// Unicast listen address for frames from explicit peers.
    pub listen: Option<SocketAddr>,

    /// Unicast peers to which local mutations are sent.
    #[serde(default)]
    pub peers: Vec<SocketAddr>,

    /// Multicast group membership.
    pub multicast: Option<MulticastConfig>,
}

impl ReplicationConfig {
    /// Whether any replication plane or peer is configured.
    pub fn is_active(&self) -> bool {
        self.listen.is_some() || self.multicast.is_some() || !self.peers.is_empty()
    }
}

/// Multicast group configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MulticastConfig {
    /// Group address to join, e.g. `239.255.70.90`.
    pub group: Ipv4Addr,

    /// UDP port for the group.
    pub port: u16,

    /// Outbound TTL for group traffic.
    #[serde(default = "default_multicast_ttl")]
    pub ttl: u32,
}

/// Expiry sweeper configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GcConfig {
    /// Seconds between sweeps of expired rows.
    #[serde(default = "default_gc_interval_secs")]
    pub interval_secs: u64,
}

impl GcConfig {
    /// Sweep interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            interval_secs: default_gc_interval_secs(),
        }
    }
}

/// Per-source-IP rate limiting for the replication receive path.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateConfig {
    /// Maximum frames per minute accepted from one source IP.
    /// Zero disables the limit.
    #[serde(default)]
    pub limit: u32,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, ANSI-colored output.
    #[default]
    Pretty,
    /// Newline-delimited JSON.
    Json,
    /// Single-line compact output.
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level filter; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include timestamps.
    #[serde(default = "default_true")]
    pub timestamps: bool,

    /// Include thread names.
    #[serde(default)]
    pub thread_names: bool,

    /// Include the module target.
    #[serde(default = "default_true")]
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: LogFormat::default(),
            timestamps: true,
            thread_names: false,
            target: true,
        }
    }
}

// Default value functions

fn default_multicast_ttl() -> u32 {
    1
}

fn default_gc_interval_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.store.path.as_os_str().is_empty() {
            return Err("store.path must not be empty".into());
        }

        if self.replication.is_active() {
            match self.replication.secret.as_deref() {
                Some(s) if !s.is_empty() => {}
                _ => {
                    return Err(
                        "replication.secret is required when any plane or peer is configured"
                            .into(),
                    )
                }
            }
        }

        if let Some(ref mc) = self.replication.multicast {
            if !mc.group.is_multicast() {
                return Err(format!("{} is not a multicast group address", mc.group).into());
            }
            if mc.port == 0 {
                return Err("replication.multicast.port must be nonzero".into());
            }
            if mc.ttl == 0 {
                return Err("replication.multicast.ttl must be at least 1".into());
            }
        }

        if self.gc.interval_secs == 0 {
            return Err("gc.interval_secs must be at least 1".into());
        }

        Ok(())
    }
}
