use crate::config::{Config, MbusConfig};
use crate::mqtt::ha_interface::HaDiscover;
use crate::mqtt::{error_topic, state_topic, Publisher};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use reader::{DeviceReader, ReadRequest, ReaderError};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use structs::{CanonicalKey, MeasurementSet, SlaveInformation};
use thiserror::Error;

pub mod interpreter;
pub mod reader;
pub mod structs;
pub mod xml_parser;

/// Published on the error topic when a meter answered without any usable value.
pub const NO_DATA_MARKER: &str = "no_data_parsed";

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid XML response: {0}")]
    Xml(#[from] roxmltree::Error),
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error(transparent)]
    Reader(#[from] ReaderError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Result of querying a single device.
#[derive(Debug)]
pub enum PollOutcome {
    Measured { data: MeasurementSet, slave: Option<SlaveInformation> },
    NoData,
    Failed(PollError),
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct MbusManager {
    config: MbusConfig,
    base_topic: String,
    ha_enabled: bool,
    pause: Duration,
    reader: Box<dyn DeviceReader>,
    publisher: Box<dyn Publisher>,
    sleeper: Box<dyn Sleeper>,
    /* Keys already announced to Home Assistant per address */
    announced: HashMap<String, BTreeSet<CanonicalKey>>,
}

impl MbusManager {
    pub fn new(config: &Config, reader: Box<dyn DeviceReader>, publisher: Box<dyn Publisher>, sleeper: Box<dyn Sleeper>) -> Self {
        return MbusManager {
            config: config.mbus.clone(),
            base_topic: config.mqtt.base_topic.clone(),
            ha_enabled: config.mqtt.ha_enabled,
            pause: config.mbus.pause_per_device(),
            reader,
            publisher,
            sleeper,
            announced: HashMap::new(),
        };
    }

    pub fn pause(&self) -> Duration {
        return self.pause;
    }

    /// Polls all devices forever.
    pub async fn start_thread(&mut self) {
        info!("Polling {} M-Bus devices on {} every {}s, {}s per device",
              self.config.addresses.len(), self.config.serial, self.config.interval, self.pause.as_secs());

        loop {
            self.run_cycle().await;
        }
    }

    pub async fn run_cycles(&mut self, cycles: usize) {
        for _ in 0..cycles {
            self.run_cycle().await;
        }
    }

    /// One pass over all addresses in configured order.
    pub async fn run_cycle(&mut self) {
        let addresses = self.config.addresses.clone();
        for address in addresses.iter() {
            let outcome = self.poll_device(address).await;
            self.report(address, outcome).await;
            self.sleeper.sleep(self.pause).await;
        }
        debug!("Cycle over {} devices complete", addresses.len());
    }

    pub async fn poll_device(&self, address: &str) -> PollOutcome {
        let request = ReadRequest {
            address,
            serial: &self.config.serial,
            baud: self.config.baud,
            timeout: self.config.read_timeout(),
        };

        let xml = match self.reader.read(&request).await {
            Ok(xml) => xml,
            Err(e) => return PollOutcome::Failed(e.into()),
        };

        let response = match xml_parser::parse_response(&xml) {
            Ok(r) => r,
            Err(e) => return PollOutcome::Failed(e.into()),
        };

        let data = interpreter::interpret_records(&response.records);
        if data.is_empty() {
            return PollOutcome::NoData;
        }

        return PollOutcome::Measured { data, slave: response.slave };
    }

    async fn report(&mut self, address: &str, outcome: PollOutcome) {
        match outcome {
            PollOutcome::Measured { data, slave } => {
                let payload = match data.to_json() {
                    Ok(p) => p,
                    Err(e) => {
                        error!("Device {address}: unable to serialize values: {e}");
                        return;
                    }
                };
                debug!("Device {address}: {payload}");
                self.publish(state_topic(&self.base_topic, address), payload).await;

                if self.ha_enabled {
                    self.announce(address, slave.as_ref(), &data).await;
                }
            },
            PollOutcome::NoData => {
                warn!("Device {address}: no current values in response");
                self.publish(error_topic(&self.base_topic, address), NO_DATA_MARKER.to_string()).await;
            },
            PollOutcome::Failed(e) => {
                warn!("Device {address}: {e}");
                self.publish(error_topic(&self.base_topic, address), e.to_string()).await;
            },
        }
    }

    /// Sends a discovery document whenever the device reports a key not announced yet.
    async fn announce(&mut self, address: &str, slave: Option<&SlaveInformation>, data: &MeasurementSet) {
        let mut keys = self.announced.get(address).cloned().unwrap_or_default();
        let known = keys.len();
        keys.extend(data.keys());
        if keys.len() == known {
            return;
        }

        let disc = HaDiscover::new(address, slave, keys.iter().copied(), state_topic(&self.base_topic, address));
        let payload = match serde_json::to_string(&disc) {
            Ok(p) => p,
            Err(e) => {
                error!("Device {address}: unable to build discovery document: {e}");
                return;
            }
        };

        match self.publisher.publish(&disc.discover_topic, payload).await {
            Ok(_) => {
                info!("Registered device {address} with Home Assistant");
                self.announced.insert(address.to_string(), keys);
            },
            Err(e) => { error!("Error sending discovery for {address}: {e}"); }
        }
    }

    async fn publish(&self, topic: String, payload: String) {
        if let Err(e) = self.publisher.publish(&topic, payload).await {
            error!("Error sending: {e}");
        }
    }
}
