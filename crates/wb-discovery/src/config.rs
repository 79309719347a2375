//! Configuration
//!
//! Layered with figment: built-in defaults, then the config file (YAML, or
//! TOML for `.toml` files), then `WB_DISCOVERY_*` environment variables with
//! `__` separating nested keys (`WB_DISCOVERY_BROKER__HOST`).

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};

use crate::transport::Qos;
use crate::{Error, Result};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "WB_DISCOVERY_";

/// Complete process configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl Config {
    /// Load and validate the configuration at `path`
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let config: Config = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Provider chain for `path`
    pub fn figment(path: &Path) -> Figment {
        let figment = Figment::from(Serialized::defaults(Config::default()));
        let figment = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => figment.merge(Toml::file(path)),
            _ => figment.merge(Yaml::file(path)),
        };
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.broker.host.trim().is_empty() {
            return Err(Error::Config("broker.host is required".to_string()));
        }
        if self.discovery.reconcile_delay_ms <= self.discovery.publish_delay_ms {
            return Err(Error::Config(format!(
                "discovery.reconcile_delay_ms ({}) must be greater than discovery.publish_delay_ms ({})",
                self.discovery.reconcile_delay_ms, self.discovery.publish_delay_ms
            )));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// General
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log verbosity; `FATAL` and `WARNING` are accepted as aliases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fatal" | "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, String> {
        value.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// Broker
// ─────────────────────────────────────────────────────────────────────────────

/// MQTT broker connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Prepended to the `/devices/...` namespace
    #[serde(default)]
    pub topic_prefix: String,
}

impl BrokerConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: None,
            password: None,
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            topic_prefix: String::new(),
        }
    }
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "wb-mqtt-discovery".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Discovery publishing behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Fixed node id; the normalized device id when absent
    pub node_id: Option<String>,
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
    #[serde(default)]
    pub subscribe_qos: Qos,
    #[serde(default)]
    pub config_qos: Qos,
    #[serde(default = "default_true")]
    pub config_retain: bool,
    #[serde(default)]
    pub availability_qos: Qos,
    #[serde(default = "default_true")]
    pub availability_retain: bool,
    #[serde(default)]
    pub ignore_availability: bool,
    #[serde(default = "default_publish_delay_ms")]
    pub publish_delay_ms: u64,
    #[serde(default = "default_reconcile_delay_ms")]
    pub reconcile_delay_ms: u64,
    /// Glob patterns over unique ids whose on/off payloads are swapped
    #[serde(default)]
    pub inverse: Vec<String>,
}

impl DiscoveryConfig {
    pub fn publish_delay(&self) -> Duration {
        Duration::from_millis(self.publish_delay_ms)
    }

    pub fn reconcile_delay(&self) -> Duration {
        Duration::from_millis(self.reconcile_delay_ms)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            node_id: None,
            manufacturer: default_manufacturer(),
            subscribe_qos: Qos::AtLeastOnce,
            config_qos: Qos::AtLeastOnce,
            config_retain: true,
            availability_qos: Qos::AtLeastOnce,
            availability_retain: true,
            ignore_availability: false,
            publish_delay_ms: default_publish_delay_ms(),
            reconcile_delay_ms: default_reconcile_delay_ms(),
            inverse: Vec::new(),
        }
    }
}

fn default_prefix() -> String {
    "homeassistant".to_string()
}

fn default_manufacturer() -> String {
    "Wiren Board".to_string()
}

fn default_true() -> bool {
    true
}

fn default_publish_delay_ms() -> u64 {
    1000
}

fn default_reconcile_delay_ms() -> u64 {
    5000
}
