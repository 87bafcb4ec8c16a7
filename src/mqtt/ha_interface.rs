use crate::metering_mbus::structs::{CanonicalKey, SlaveInformation};
use serde::Serialize;

#[derive(Serialize)]
pub struct HaDevice {
    ids: String,
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    manufacturer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    model: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    serial_number: String,
}

#[derive(Serialize)]
pub struct HaOrigin {
    pub name: String,
    pub sw_version: String,
}

#[derive(Serialize)]
pub struct HaComponent {
    pub p: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    pub unit_of_measurement: String,
    pub value_template: String,
    pub unique_id: String,
    pub object_id: String,
    pub state_class: String,
}

impl HaComponent {
    pub fn new_sensor(address: &str, key: CanonicalKey) -> Self {
        let (name, device_class, unit, state_class) = match key {
            CanonicalKey::EnergyKwh => ("Energy", Some("energy"), "kWh", "total_increasing"),
            CanonicalKey::TempFlowC => ("Flow temperature", Some("temperature"), "°C", "measurement"),
            CanonicalKey::TempReturnC => ("Return temperature", Some("temperature"), "°C", "measurement"),
            CanonicalKey::DeltaTC => ("Temperature difference", Some("temperature"), "K", "measurement"),
            CanonicalKey::PowerKw => ("Power", Some("power"), "kW", "measurement"),
            CanonicalKey::FlowLh => ("Volume flow", None, "L/h", "measurement"),
            CanonicalKey::VolumeM3 => ("Volume", Some("water"), "m³", "total_increasing"),
            CanonicalKey::VolumeL => ("Volume liters", Some("water"), "L", "total_increasing"),
        };

        let json_key = key.as_str();
        return HaComponent {
            p: "sensor".to_string(),
            name: name.to_string(),
            device_class: device_class.map(|d| d.to_string()),
            unit_of_measurement: unit.to_string(),
            value_template: format!("{{{{ value_json.{json_key} }}}}"),
            unique_id: format!("mbus2mqtt_{address}_{json_key}"),
            object_id: format!("mbus_{address}_{json_key}"),
            state_class: state_class.to_string(),
        };
    }
}

/// Home Assistant device discovery document for one meter.
#[derive(Serialize)]
pub struct HaDiscover {
    pub dev: HaDevice,
    pub o: HaOrigin,
    pub cmps: serde_json::Map<String, serde_json::Value>,
    pub state_topic: String,
    pub qos: u32,
    #[serde(skip_serializing)]
    pub discover_topic: String,
}

impl HaDiscover {
    /// Announces one sensor per key in `keys`, only those appear on the state topic.
    pub fn new<I: IntoIterator<Item = CanonicalKey>>(address: &str, slave: Option<&SlaveInformation>, keys: I, state_topic: String) -> Self {
        let slave = slave.cloned().unwrap_or_default();

        let mut cmps = serde_json::Map::new();
        for key in keys {
            let cmp = HaComponent::new_sensor(address, key);
            if let Ok(value) = serde_json::to_value(cmp) {
                cmps.insert(format!("mbus_{address}_{}", key.as_str()), value);
            }
        }

        return HaDiscover {
            discover_topic: format!("homeassistant/device/mbus2mqtt_{address}/config"),
            dev: HaDevice {
                ids: format!("mbus2mqtt_{address}"),
                name: format!("M-Bus meter {address}"),
                manufacturer: slave.manufacturer.unwrap_or_default(),
                model: slave.product_name.unwrap_or_default(),
                serial_number: slave.id.unwrap_or_default(),
            },
            o: HaOrigin {
                name: "mbus2mqtt".to_string(),
                sw_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            cmps,
            state_topic,
            qos: 0,
        };
    }
}
