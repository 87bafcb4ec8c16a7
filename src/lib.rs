//! M-Bus to MQTT gateway
//!
//! Polls meters through the libmbus command line tools, converts the readings
//! into canonical units and publishes them to an MQTT broker.

pub mod config;
pub mod metering_mbus;
pub mod mqtt;

// Re-export common types for easier access
pub use config::Config;
pub use metering_mbus::{MbusManager, PollOutcome};
pub use metering_mbus::interpreter::interpret;
pub use metering_mbus::structs::{CanonicalKey, MeasurementSet};
pub use mqtt::{MqttManager, Publisher};
