//! Proxy configuration.
//!
//! Loaded from a TOML file (or defaults), then patched with command line
//! overrides.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "adsink.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub resolver: ResolverConfig,
    pub blocking: BlockingConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for both UDP and TCP listeners
    pub bind: String,
    /// Listen port
    pub port: u16,
    /// Upstream DNS server (host:port)
    pub upstream: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 53,
            upstream: "8.8.8.8:53".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Timeout for the first UDP attempt
    pub udp_timeout_ms: u64,
    /// Timeout for the TCP fallback
    pub tcp_timeout_ms: u64,
}

impl ResolverConfig {
    pub fn udp_timeout(&self) -> Duration {
        Duration::from_millis(self.udp_timeout_ms)
    }

    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_millis(self.tcp_timeout_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            udp_timeout_ms: 500,
            tcp_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockingConfig {
    /// When false every query is allowed
    pub enabled: bool,
    /// Local blocklist files, hosts format or one domain per line
    pub lists: Vec<PathBuf>,
    /// Regex heuristics tested against the full queried name
    pub regex: Vec<String>,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lists: Vec::new(),
            regex: vec![
                r"^rr[\w-]+\.googlevideo\.com$".to_string(),
                r"^ad[s]?[\w-]*\.".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Number of recent query events kept for late subscribers
    pub history: usize,
    /// Queue depth per subscriber before events are dropped
    pub subscriber_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history: 100,
            subscriber_capacity: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Interval of the periodic stats log line, 0 disables it
    pub stats_interval_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            stats_interval_secs: 60,
        }
    }
}

/// Values given on the command line, applied on top of the loaded file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub upstream: Option<String>,
    pub blocklists: Vec<PathBuf>,
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration.
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. adsink.toml in current directory
    /// 3. Default configuration
    pub fn load(path: Option<&Path>, overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_cli_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.display().to_string(), e.to_string()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(bind) = overrides.bind {
            self.server.bind = bind;
        }
        if let Some(upstream) = overrides.upstream {
            self.server.upstream = upstream;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        self.blocking.lists.extend(overrides.blocklists);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port cannot be 0".to_string()));
        }
        if self.server.upstream.trim().is_empty() {
            return Err(ConfigError::Validation(
                "no upstream server configured".to_string(),
            ));
        }
        self.listen_addr()?;

        let resolver = &self.resolver;
        if resolver.udp_timeout_ms == 0 || resolver.tcp_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "resolver timeouts must be greater than 0".to_string(),
            ));
        }
        if resolver.udp_timeout_ms >= resolver.tcp_timeout_ms {
            return Err(ConfigError::Validation(format!(
                "udp_timeout_ms ({}) must be shorter than tcp_timeout_ms ({})",
                resolver.udp_timeout_ms, resolver.tcp_timeout_ms
            )));
        }

        if self.events.subscriber_capacity == 0 {
            return Err(ConfigError::Validation(
                "events.subscriber_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Socket address both listeners bind to.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.server.bind.parse().map_err(|_| {
            ConfigError::Validation(format!("invalid bind address {:?}", self.server.bind))
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }
}
