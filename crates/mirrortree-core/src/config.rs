//! Scan and replication configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use derive_builder::Builder;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SnapshotError};

/// Well-known port destinations listen on.
pub const DEFAULT_PORT: u16 = 6666;

/// Configuration for building a snapshot.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root path to snapshot.
    pub root: PathBuf,

    /// Number of threads for walking and hashing (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Glob patterns matched against entry names; matches are not replicated.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                Err("Root path cannot be empty".to_string())
            }
            Some(_) => Ok(()),
            None => Err("Root path is required".to_string()),
        }
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            threads: 0,
            include_hidden: true,
            ignore_patterns: Vec::new(),
        }
    }

    /// Compile the ignore patterns.
    pub fn ignore_matcher(&self) -> Result<GlobSet, SnapshotError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.ignore_patterns {
            let glob = Glob::new(pattern).map_err(|e| SnapshotError::InvalidConfig {
                message: format!("bad ignore pattern {pattern:?}: {e}"),
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|e| SnapshotError::InvalidConfig {
            message: e.to_string(),
        })
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// A host that receives changesets, optionally with its own port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Destination {
    host: String,
    port: Option<u16>,
}

impl Destination {
    /// Create a destination on the default port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
        }
    }

    /// Override the port for this destination.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Socket address to connect to.
    pub fn address(&self, default_port: u16) -> String {
        let port = self.port.unwrap_or(default_port);
        if self.host.contains(':') {
            format!("[{}]:{port}", self.host)
        } else {
            format!("{}:{port}", self.host)
        }
    }
}

impl FromStr for Destination {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |message: &str| ConfigError::Invalid {
            message: format!("destination {s:?}: {message}"),
        };
        let parse_port = |port: &str| {
            port.parse::<u16>()
                .map_err(|_| invalid("port must be a number between 0 and 65535"))
        };

        if s.is_empty() {
            return Err(invalid("empty host"));
        }

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(|| invalid("missing ']'"))?;
            let port = match after {
                "" => None,
                _ => Some(parse_port(
                    after.strip_prefix(':').ok_or_else(|| invalid("expected ':' after ']'"))?,
                )?),
            };
            (host, port)
        } else if s.matches(':').count() == 1 {
            let (host, port) = s.split_once(':').ok_or_else(|| invalid("missing port"))?;
            (host, Some(parse_port(port)?))
        } else {
            (s, None)
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => f.write_str(&self.address(port)),
            None => f.write_str(&self.host),
        }
    }
}

impl TryFrom<String> for Destination {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Destination> for String {
    fn from(value: Destination) -> Self {
        value.to_string()
    }
}

/// Configuration for a replication process.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ReplicaConfig {
    /// Directory to replicate.
    pub root: PathBuf,

    /// Hosts that receive every changeset.
    #[builder(default)]
    #[serde(default)]
    pub destinations: Vec<Destination>,

    /// Port used for destinations that do not name one.
    #[builder(default = "DEFAULT_PORT")]
    #[serde(default = "default_port")]
    pub port: u16,

    /// Delay between the initial sync and the first incremental cycle.
    #[builder(default = "30")]
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Delay between incremental cycles.
    #[builder(default = "1800")]
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Connection timeout in milliseconds.
    #[builder(default = "10_000")]
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Timeout for a single write in milliseconds.
    #[builder(default = "30_000")]
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// Number of threads for walking and hashing (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Glob patterns for entries that are not replicated.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_initial_delay() -> u64 {
    30
}

fn default_interval() -> u64 {
    1800
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_write_timeout() -> u64 {
    30_000
}

impl ReplicaConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Root path cannot be empty".to_string());
            }
            Some(_) => {}
            None => return Err("Root path is required".to_string()),
        }
        if self.destinations.as_ref().is_none_or(Vec::is_empty) {
            return Err("At least one destination is required".to_string());
        }
        if self.interval_secs == Some(0) {
            return Err("Cycle interval must be positive".to_string());
        }
        Ok(())
    }
}

impl ReplicaConfig {
    /// Create a new replica config builder.
    pub fn builder() -> ReplicaConfigBuilder {
        ReplicaConfigBuilder::default()
    }

    /// Load a config from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the same invariants the builder enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };
        if self.root.as_os_str().is_empty() {
            return invalid("Root path cannot be empty");
        }
        if self.destinations.is_empty() {
            return invalid("At least one destination is required");
        }
        if self.interval_secs == 0 {
            return invalid("Cycle interval must be positive");
        }
        Ok(())
    }

    /// Scan settings derived from this config.
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            root: self.root.clone(),
            threads: self.threads,
            include_hidden: self.include_hidden,
            ignore_patterns: self.ignore_patterns.clone(),
        }
    }

    /// Delay between the initial sync and the first incremental cycle.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    /// Delay between incremental cycles.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Connection timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Timeout for a single write.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
