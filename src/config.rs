//! Configuration loading and types for fileherd.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  The controller and file server binaries share one
//! file; each reads its own subsection plus the common logging and
//! observability settings.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Controller settings.
    #[serde(default)]
    pub controller: ControllerConfig,

    /// File server settings.
    #[serde(default)]
    pub fileserver: FileServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics and the health check).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Controller listener and policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Bind host address for both listeners.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port serving the client-facing RPC surface.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Port accepting file server registration connections.
    #[serde(default = "default_register_port")]
    pub register_port: u16,

    /// Strategy used to place new files.
    #[serde(default)]
    pub placement: PlacementKind,

    /// What happens to a departed node's file records.
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,

    /// How long a fresh registration connection may take to send its
    /// `register` frame, in milliseconds.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

impl ControllerConfig {
    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.host, self.rpc_port)
    }

    pub fn register_addr(&self) -> String {
        format!("{}:{}", self.host, self.register_port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            rpc_port: default_rpc_port(),
            register_port: default_register_port(),
            placement: PlacementKind::default(),
            orphan_policy: OrphanPolicy::default(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

/// Placement strategy selector.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlacementKind {
    /// Node with the fewest assigned bytes wins; ties go to the lowest address.
    #[default]
    LeastLoaded,
    /// Cycle through nodes in address order.
    RoundRobin,
    /// Rendezvous hash of the file name.
    Hash,
    /// Uniform random choice.
    Random,
}

/// Fate of file records whose owner deregisters.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Leave the records in place; lookups return the departed owner.
    #[default]
    Keep,
    /// Drop the records together with the membership entry.
    Purge,
}

/// File server listener and registration configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FileServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port. `0` picks an ephemeral port.
    #[serde(default = "default_fileserver_port")]
    pub port: u16,

    /// Address announced to the controller. Defaults to the bound address.
    #[serde(default)]
    pub advertise: Option<String>,

    /// Root directory every request path is resolved against.
    #[serde(default = "default_root_dir")]
    pub root_dir: String,

    /// Registration address of the controller (`host:port`).
    #[serde(default = "default_controller_addr")]
    pub controller: String,

    /// Dial + handshake timeout for registration, in milliseconds.
    #[serde(default = "default_register_timeout_ms")]
    pub register_timeout_ms: u64,
}

impl FileServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn register_timeout(&self) -> Duration {
        Duration::from_millis(self.register_timeout_ms)
    }
}

impl Default for FileServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_fileserver_port(),
            advertise: None,
            root_dir: default_root_dir(),
            controller: default_controller_addr(),
            register_timeout_ms: default_register_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
///
/// Controls Prometheus metrics collection and the `/health` check.
/// Both are enabled by default.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Enable the `/health` check.
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            health_check: true,
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rpc_port() -> u16 {
    2124
}

fn default_register_port() -> u16 {
    2125
}

fn default_fileserver_port() -> u16 {
    2126
}

fn default_root_dir() -> String {
    "./data/files".to_string()
}

fn default_controller_addr() -> String {
    "127.0.0.1:2125".to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    2_000
}

fn default_register_timeout_ms() -> u64 {
    1_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_config(&contents)
}

/// Parse configuration from YAML text. An empty document yields defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
}
