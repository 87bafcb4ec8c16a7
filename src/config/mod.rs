use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const CONFIG_PATH_ENV: &str = "MBUS2MQTT_CONFIG";
const CONFIG_CANDIDATES: [&str; 2] = ["config/mbus2mqtt.yaml", "mbus2mqtt.yaml"];

fn mbus_serial_default() -> String { return "/dev/ttyAMA4".to_string() }
fn mbus_baud_default() -> u32 { return 2400 }
fn mbus_addresses_default() -> Vec<String> { return vec!["1".to_string()] }
fn mbus_interval_default() -> u64 { return 30 }
fn mbus_timeout_default() -> u64 { return 10 }
fn mbus_tool_default() -> String { return "mbus-serial-request-data".to_string() }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MbusConfig {
    #[serde(default="mbus_serial_default")]
    pub serial: String,
    #[serde(default="mbus_baud_default")]
    pub baud: u32,
    #[serde(default="mbus_addresses_default")]
    pub addresses: Vec<String>,
    /// Seconds one full cycle over all addresses should take
    #[serde(default="mbus_interval_default")]
    pub interval: u64,
    /// Seconds before a running readout gets killed
    #[serde(default="mbus_timeout_default")]
    pub timeout: u64,
    #[serde(default="mbus_tool_default")]
    pub tool: String,
}

impl Default for MbusConfig {
    fn default() -> Self {
        return MbusConfig {
            serial: mbus_serial_default(),
            baud: mbus_baud_default(),
            addresses: mbus_addresses_default(),
            interval: mbus_interval_default(),
            timeout: mbus_timeout_default(),
            tool: mbus_tool_default(),
        }
    }
}

impl MbusConfig {
    /// Sleep between two devices so that a whole cycle takes roughly `interval` seconds.
    pub fn pause_per_device(&self) -> Duration {
        let devices = std::cmp::max(1, self.addresses.len() as u64);
        return Duration::from_secs(std::cmp::max(1, self.interval / devices));
    }

    pub fn read_timeout(&self) -> Duration {
        return Duration::from_secs(self.timeout);
    }
}

fn mqtt_host_default() -> String { return "mosquitto".to_string() }
fn mqtt_port_default() -> u16 { return 1883 }
fn mqtt_client_name_default() -> String { return "mbus2mqtt".to_string() }
fn mqtt_base_topic_default() -> String { return "mbus".to_string() }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MqttConfig {
    #[serde(default="mqtt_host_default")]
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
    #[serde(default="mqtt_base_topic_default")]
    pub base_topic: String,
    #[serde(default)]
    pub ha_enabled: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        return MqttConfig {
            host: mqtt_host_default(),
            port: mqtt_port_default(),
            user: String::new(),
            pass: String::new(),
            client_name: mqtt_client_name_default(),
            base_topic: mqtt_base_topic_default(),
            ha_enabled: false,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub mbus: MbusConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("Unable to parse config file {path}: {source}")]
    Yaml { path: String, source: serde_yml::Error },
    #[error("Invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },
    #[error("No M-Bus addresses configured")]
    NoAddresses,
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl Config {
    /// Defaults, then the optional YAML file, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let lookup = |name: &str| std::env::var(name).ok();

        let mut config = match find_config_file(&lookup) {
            Some(path) => {
                info!("Reading configuration from {}", path.display());
                Config::from_file(&path)?
            },
            None => {
                debug!("No config file found, using defaults and environment");
                Config::default()
            }
        };

        config.apply_env(lookup)?;
        config.validate()?;
        return Ok(config);
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let c: Config = serde_yml::from_str(&contents).map_err(|e| ConfigError::Yaml {
            path: path.display().to_string(),
            source: e,
        })?;
        return Ok(c);
    }

    /// Overrides every field that has a matching variable in `lookup`.
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) -> Result<(), ConfigError> {
        if let Some(v) = lookup("MBUS_SERIAL") { self.mbus.serial = v; }
        if let Some(v) = lookup("MBUS_BAUD") { self.mbus.baud = parse_number("MBUS_BAUD", &v)?; }
        /* MBUS_ADDR is the old single device variant */
        if let Some(v) = lookup("MBUS_ADDRS").or_else(|| lookup("MBUS_ADDR")) {
            self.mbus.addresses = parse_addresses(&v);
        }
        if let Some(v) = lookup("INTERVAL") { self.mbus.interval = parse_number("INTERVAL", &v)?; }
        if let Some(v) = lookup("MBUS_TIMEOUT") { self.mbus.timeout = parse_number("MBUS_TIMEOUT", &v)?; }
        if let Some(v) = lookup("MBUS_TOOL") { self.mbus.tool = v; }

        if let Some(v) = lookup("MQTT_HOST") { self.mqtt.host = v; }
        if let Some(v) = lookup("MQTT_PORT") { self.mqtt.port = parse_number("MQTT_PORT", &v)?; }
        if let Some(v) = lookup("MQTT_USER") { self.mqtt.user = v; }
        if let Some(v) = lookup("MQTT_PASS") { self.mqtt.pass = v; }
        if let Some(v) = lookup("MQTT_CLIENT_NAME") { self.mqtt.client_name = v; }
        if let Some(v) = lookup("MQTT_BASE_TOPIC") { self.mqtt.base_topic = v; }
        if let Some(v) = lookup("MQTT_HA_ENABLED") { self.mqtt.ha_enabled = parse_bool("MQTT_HA_ENABLED", &v)?; }

        return Ok(());
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mbus.addresses.is_empty() {
            return Err(ConfigError::NoAddresses);
        }
        if self.mbus.baud == 0 {
            return Err(ConfigError::Zero("baud rate"));
        }
        if self.mbus.timeout == 0 {
            return Err(ConfigError::Zero("read timeout"));
        }
        return Ok(());
    }
}

fn find_config_file<F: Fn(&str) -> Option<String>>(lookup: &F) -> Option<PathBuf> {
    /* An explicit path is used even if it does not exist so the error is reported */
    if let Some(path) = lookup(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }

    return CONFIG_CANDIDATES.iter()
        .map(|p| PathBuf::from(*p))
        .find(|p| p.is_file());
}

/// Splits a comma separated address list, dropping empty entries.
pub fn parse_addresses(list: &str) -> Vec<String> {
    return list.split(',')
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .map(|a| a.to_string())
        .collect();
}

fn parse_number<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    return value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    });
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue { name, value: value.to_string() }),
    }
}
