//! WolfGate Configuration
//!
//! This module provides configuration structures for the WolfGate
//! peer provisioning service. Every field has a default so the service can
//! run from environment variables alone.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the API bearer token
pub const ENV_AUTH_TOKEN: &str = "WG_AUTH_TOKEN";
/// Environment variable overriding the WireGuard listen port
pub const ENV_PORT: &str = "WG_PORT";
/// Environment variable overriding the advertised server endpoint
pub const ENV_ENDPOINT: &str = "WG_ENDPOINT";

/// Main WolfGate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WolfGateConfig {
    /// WireGuard interface configuration
    #[serde(default)]
    pub wireguard: WireGuardConfig,

    /// Client address pool and artifact settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// WireGuard interface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireGuardConfig {
    /// Interface name managed by this service
    #[serde(default = "default_interface")]
    pub interface: String,

    /// UDP port the interface listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Externally reachable server address (discovered when unset)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Directory holding one `<name>.conf` per client
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Upper bound for any single `wg` invocation
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

/// Client address pool and artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// First three octets of the IPv4 pool, e.g. "10.66.66"
    #[serde(default = "default_ipv4_prefix")]
    pub ipv4_prefix: String,

    /// IPv6 pool prefix, the client octet is appended to it
    #[serde(default = "default_ipv6_prefix")]
    pub ipv6_prefix: String,

    /// DNS resolvers written into client configs
    #[serde(default = "default_dns")]
    pub dns: Vec<String>,

    /// Keepalive interval in seconds written into client configs
    #[serde(default = "default_keepalive")]
    pub persistent_keepalive: u16,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Shared bearer token required on every request
    #[serde(default)]
    pub token: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_interface() -> String {
    "wg0".to_string()
}

fn default_listen_port() -> u16 {
    51820
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/wireguard")
}

fn default_command_timeout() -> u64 {
    10
}

fn default_ipv4_prefix() -> String {
    "10.66.66".to_string()
}

fn default_ipv6_prefix() -> String {
    "fd42:42:42::".to_string()
}

fn default_dns() -> Vec<String> {
    vec!["1.1.1.1".to_string(), "1.0.0.1".to_string()]
}

fn default_keepalive() -> u16 {
    25
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for WireGuardConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            listen_port: default_listen_port(),
            endpoint: None,
            config_dir: default_config_dir(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ipv4_prefix: default_ipv4_prefix(),
            ipv6_prefix: default_ipv6_prefix(),
            dns: default_dns(),
            persistent_keepalive: default_keepalive(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            token: String::new(),
            cors_enabled: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl WolfGateConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist, then apply environment overrides and validate.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::debug!("No configuration file at {:?}, using defaults", path);
            WolfGateConfig::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfGateConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_AUTH_TOKEN).filter(|t| !t.is_empty()) {
            self.api.token = token;
        }
        if let Some(port) = lookup(ENV_PORT).filter(|p| !p.is_empty()) {
            self.wireguard.listen_port = port.parse().map_err(|_| {
                crate::Error::Config(format!("{} is not a valid port: {}", ENV_PORT, port))
            })?;
        }
        if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|e| !e.is_empty()) {
            self.wireguard.endpoint = Some(endpoint);
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.api.token.is_empty() {
            return Err(crate::Error::Config(format!(
                "api.token cannot be empty (set it in the config file or {})",
                ENV_AUTH_TOKEN
            )));
        }

        if self.wireguard.interface.is_empty() {
            return Err(crate::Error::Config("wireguard.interface cannot be empty".into()));
        }

        if self.wireguard.command_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "wireguard.command_timeout_secs must be greater than zero".into(),
            ));
        }

        self.ipv4_base()?;
        self.ipv6_base()?;

        Ok(())
    }

    /// Network address of the IPv4 pool (last octet zero)
    pub fn ipv4_base(&self) -> crate::Result<Ipv4Addr> {
        let prefix = &self.network.ipv4_prefix;
        let octets = prefix.split('.').count();
        if octets != 3 {
            return Err(crate::Error::Config(format!(
                "network.ipv4_prefix must have three octets: {}",
                prefix
            )));
        }
        format!("{}.0", prefix).parse().map_err(|_| {
            crate::Error::Config(format!("network.ipv4_prefix is invalid: {}", prefix))
        })
    }

    /// Base address of the IPv6 pool
    pub fn ipv6_base(&self) -> crate::Result<Ipv6Addr> {
        let prefix = &self.network.ipv6_prefix;
        if !prefix.ends_with("::") {
            return Err(crate::Error::Config(format!(
                "network.ipv6_prefix must end with '::': {}",
                prefix
            )));
        }
        prefix.parse().map_err(|_| {
            crate::Error::Config(format!("network.ipv6_prefix is invalid: {}", prefix))
        })
    }

    /// Get the command timeout as Duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.wireguard.command_timeout_secs)
    }

    /// Get the client config directory path
    pub fn config_dir(&self) -> &PathBuf {
        &self.wireguard.config_dir
    }
}
