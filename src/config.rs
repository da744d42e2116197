//! Configuration management for Selene
//!
//! The whole process is assembled from one [`Config`] value. It is parsed
//! from YAML once at startup, validated, and never mutated afterwards.
//! Subsystem blocks that select an implementation by name (`hems`,
//! messaging services, meters, chargers, vehicles) use [`TypedConfig`]: a
//! `type` key plus free-form options decoded by the chosen implementation.

use crate::error::{Result, SeleneError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Measurement interval of the site loop in seconds
    pub interval: u64,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Site (grid connection) configuration
    pub site: SiteConfig,

    /// Ordered load point blocks, decoded individually during bootstrap
    pub loadpoints: Option<Vec<serde_yaml::Value>>,

    /// Named meter devices
    pub meters: Vec<NamedConfig>,

    /// Named charger devices
    pub chargers: Vec<NamedConfig>,

    /// Named vehicle devices
    pub vehicles: Vec<NamedConfig>,

    /// MQTT broker connection
    pub mqtt: MqttConfig,

    /// Embedded scripting VMs
    pub javascript: Vec<ScriptConfig>,

    /// Sponsorship token, verified remotely when set
    pub sponsortoken: String,

    /// Time-series telemetry sink
    pub influx: InfluxConfig,

    /// Home energy management integration
    pub hems: TypedConfig,

    /// Push notifications
    pub messaging: MessagingConfig,
}

/// A block selecting an implementation by `type`, with implementation options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypedConfig {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(flatten)]
    pub other: serde_yaml::Mapping,
}

impl TypedConfig {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            other: serde_yaml::Mapping::new(),
        }
    }

    /// Builder-style option setter, mostly useful for tests
    pub fn with(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.other
            .insert(serde_yaml::Value::String(key.to_string()), value.into());
        self
    }

    /// Decode the implementation options into a typed struct
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        decode_other(&serde_yaml::Value::Mapping(self.other.clone()))
    }
}

/// A typed block that is referenced from elsewhere by `name`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedConfig {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(flatten)]
    pub other: serde_yaml::Mapping,
}

impl NamedConfig {
    pub fn typed(&self) -> TypedConfig {
        TypedConfig {
            kind: self.kind.clone(),
            other: self.other.clone(),
        }
    }
}

/// Decode a loosely-typed YAML value into a typed struct
pub fn decode_other<T: DeserializeOwned>(value: &serde_yaml::Value) -> Result<T> {
    Ok(serde_yaml::from_value(value.clone())?)
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Log file path (its directory receives daily rotated files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Display title
    pub title: String,

    /// Meter references
    pub meters: SiteMetersConfig,

    /// Power kept in reserve at the grid connection (W); read by the
    /// charging controller, accepted and ignored here
    #[serde(alias = "residualPower")]
    pub residual_power: f64,
}

/// Meter references of a site, by device name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteMetersConfig {
    pub grid: Option<String>,
    pub pv: Vec<String>,
    pub battery: Option<String>,
}

/// MQTT broker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker address as `host[:port]`, optionally with `tcp://` or `mqtt://`
    pub broker: String,
    pub user: String,
    pub password: String,
    /// Root topic measurements are published under (default `selene`)
    pub topic: String,
}

impl MqttConfig {
    pub fn root_topic(&self) -> &str {
        let topic = self.topic.trim().trim_end_matches('/');
        if topic.is_empty() { "selene" } else { topic }
    }
}

/// One embedded scripting VM
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// VM name devices refer to
    pub vm: String,

    /// Initialization script run once at startup
    pub script: String,
}

/// InfluxDB sink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub url: String,
    /// InfluxDB 2.x API token; selects the v2 write API when set
    pub token: String,
    pub org: String,
    pub user: String,
    pub password: String,
    /// Database (v1) or bucket (v2)
    pub database: String,
}

impl InfluxConfig {
    pub fn enabled(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Message template for a named event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventTemplate {
    pub title: String,
    pub msg: String,
}

/// Push messaging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Templates keyed by event name (e.g. `start`, `stop`, `connect`)
    pub events: HashMap<String, EventTemplate>,

    /// Push back-ends
    pub services: Vec<TypedConfig>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Load configuration from the first existing default location
    pub fn load() -> Result<Self> {
        let default_paths = [
            "selene.yaml",
            "/data/selene.yaml",
            "/etc/selene/selene.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Err(SeleneError::config(format!(
            "missing selene config (searched {})",
            default_paths.join(", ")
        )))
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(SeleneError::validation("interval", "Must be greater than 0"));
        }

        if let Some(loadpoints) = &self.loadpoints {
            for (idx, lp) in loadpoints.iter().enumerate() {
                if !lp.is_mapping() {
                    return Err(SeleneError::validation(
                        format!("loadpoints[{}]", idx),
                        "Must be a mapping".to_string(),
                    ));
                }
            }
        }

        for (section, devices) in [
            ("meters", &self.meters),
            ("chargers", &self.chargers),
            ("vehicles", &self.vehicles),
        ] {
            let mut seen = HashSet::new();
            for dev in devices {
                if dev.name.trim().is_empty() {
                    return Err(SeleneError::validation(section, "Device name cannot be empty"));
                }
                if dev.kind.trim().is_empty() {
                    return Err(SeleneError::validation(
                        format!("{}.{}", section, dev.name),
                        "Device type cannot be empty".to_string(),
                    ));
                }
                if !seen.insert(dev.name.as_str()) {
                    return Err(SeleneError::validation(
                        format!("{}.{}", section, dev.name),
                        "Duplicate device name".to_string(),
                    ));
                }
            }
        }

        if !self.influx.enabled()
            && (!self.influx.database.is_empty() || !self.influx.token.is_empty())
        {
            return Err(SeleneError::validation(
                "influx.url",
                "URL required when influx is configured",
            ));
        }

        for service in &self.messaging.services {
            if service.kind.trim().is_empty() {
                return Err(SeleneError::validation(
                    "messaging.services",
                    "Service type cannot be empty",
                ));
            }
        }

        for (name, template) in &self.messaging.events {
            for text in [&template.title, &template.msg] {
                crate::push::validate_template(text).map_err(|e| {
                    SeleneError::validation(format!("messaging.events.{}", name), e.to_string())
                })?;
            }
        }

        Ok(())
    }
}
