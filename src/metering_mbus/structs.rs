use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One `DataRecord` of a meter response, all fields as the tool printed them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub unit: Option<String>,
    pub value: Option<String>,
    pub function: Option<String>,
    pub storage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlaveInformation {
    pub id: Option<String>,
    pub manufacturer: Option<String>,
    pub version: Option<String>,
    pub product_name: Option<String>,
    pub medium: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MbusResponse {
    pub slave: Option<SlaveInformation>,
    pub records: Vec<RawRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CanonicalKey {
    #[serde(rename = "energy_kwh")]
    EnergyKwh,
    #[serde(rename = "temp_flow_c")]
    TempFlowC,
    #[serde(rename = "temp_return_c")]
    TempReturnC,
    #[serde(rename = "delta_t_c")]
    DeltaTC,
    #[serde(rename = "power_kw")]
    PowerKw,
    #[serde(rename = "flow_lh")]
    FlowLh,
    #[serde(rename = "volume_m3")]
    VolumeM3,
    #[serde(rename = "volume_l")]
    VolumeL,
}

impl CanonicalKey {
    pub const ALL: [CanonicalKey; 8] = [
        CanonicalKey::EnergyKwh,
        CanonicalKey::TempFlowC,
        CanonicalKey::TempReturnC,
        CanonicalKey::DeltaTC,
        CanonicalKey::PowerKw,
        CanonicalKey::FlowLh,
        CanonicalKey::VolumeM3,
        CanonicalKey::VolumeL,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalKey::EnergyKwh => "energy_kwh",
            CanonicalKey::TempFlowC => "temp_flow_c",
            CanonicalKey::TempReturnC => "temp_return_c",
            CanonicalKey::DeltaTC => "delta_t_c",
            CanonicalKey::PowerKw => "power_kw",
            CanonicalKey::FlowLh => "flow_lh",
            CanonicalKey::VolumeM3 => "volume_m3",
            CanonicalKey::VolumeL => "volume_l",
        }
    }
}

/// Unit converted values of one poll, keyed by canonical name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementSet {
    values: BTreeMap<CanonicalKey, f64>,
}

impl MeasurementSet {
    pub fn new() -> Self {
        return MeasurementSet { values: BTreeMap::new() };
    }

    pub fn insert(&mut self, key: CanonicalKey, value: f64) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: CanonicalKey) -> Option<f64> {
        return self.values.get(&key).copied();
    }

    pub fn contains(&self, key: CanonicalKey) -> bool {
        return self.values.contains_key(&key);
    }

    pub fn is_empty(&self) -> bool {
        return self.values.is_empty();
    }

    pub fn len(&self) -> usize {
        return self.values.len();
    }

    pub fn keys(&self) -> impl Iterator<Item = CanonicalKey> + '_ {
        return self.values.keys().copied();
    }

    /// Compact JSON as published on the state topic, keys in `CanonicalKey` order.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        return serde_json::to_string(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_match_serde() {
        for key in CanonicalKey::ALL {
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, format!("\"{}\"", key.as_str()));
        }
    }

    #[test]
    fn test_compact_json() {
        let mut set = MeasurementSet::new();
        set.insert(CanonicalKey::VolumeL, 2500.0);
        set.insert(CanonicalKey::EnergyKwh, 100.0);
        set.insert(CanonicalKey::TempFlowC, 65.43);

        assert_eq!(set.to_json().unwrap(), r#"{"energy_kwh":100.0,"temp_flow_c":65.43,"volume_l":2500.0}"#);
    }

    #[test]
    fn test_json_values_survive_parsing() {
        let mut set = MeasurementSet::new();
        set.insert(CanonicalKey::EnergyKwh, 12345.678);
        set.insert(CanonicalKey::DeltaTC, 6543.0 / 100.0);
        set.insert(CanonicalKey::PowerKw, 1e-7);
        set.insert(CanonicalKey::FlowLh, -3.5);

        let back: MeasurementSet = serde_json::from_str(&set.to_json().unwrap()).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_insert_replaces() {
        let mut set = MeasurementSet::new();
        set.insert(CanonicalKey::PowerKw, 1.0);
        set.insert(CanonicalKey::PowerKw, 2.0);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(CanonicalKey::PowerKw), Some(2.0));
    }
}
