use super::structs::{CanonicalKey, MeasurementSet, RawRecord};
use super::{xml_parser, ParseError};
use log::{debug, trace};

/// Conversion selected by the (normalized) unit label of a record.
#[derive(Debug, Clone, Copy, PartialEq)]
enum UnitRule {
    /// Factor to kWh
    Energy(f64),
    FlowTemperature,
    ReturnTemperature,
    TemperatureDifference,
    Power,
    VolumeFlow,
    /// Divisor to m^3 and factor to liters
    Volume { m3_divisor: f64, l_factor: f64 },
}

/// Parses the tool output and maps all current values to canonical keys.
///
/// An empty result is not an error, the caller decides how to report it.
pub fn interpret(xml: &str) -> Result<MeasurementSet, ParseError> {
    let response = xml_parser::parse_response(xml)?;
    return Ok(interpret_records(&response.records));
}

pub fn interpret_records(records: &[RawRecord]) -> MeasurementSet {
    let mut data = MeasurementSet::new();

    for rec in records {
        let value = match parse_value(rec.value.as_deref()) {
            Some(v) => v,
            None => {
                trace!("Skipping record without numeric value: {:?}", rec);
                continue;
            }
        };

        if !is_current(rec) {
            continue;
        }

        let unit = normalize(rec.unit.as_deref().unwrap_or(""));
        match classify_unit(&unit) {
            Some(UnitRule::Energy(factor)) => data.insert(CanonicalKey::EnergyKwh, value * factor),
            Some(UnitRule::FlowTemperature) => data.insert(CanonicalKey::TempFlowC, value / 100.0),
            Some(UnitRule::ReturnTemperature) => data.insert(CanonicalKey::TempReturnC, value / 100.0),
            Some(UnitRule::TemperatureDifference) => data.insert(CanonicalKey::DeltaTC, value / 100.0),
            /* "Power (100 W)" is the only variant seen so far, every power unit is scaled alike */
            Some(UnitRule::Power) => data.insert(CanonicalKey::PowerKw, value * 0.1),
            Some(UnitRule::VolumeFlow) => data.insert(CanonicalKey::FlowLh, value),
            Some(UnitRule::Volume { m3_divisor, l_factor }) => {
                /* Meters report the volume in more than one resolution, only take the first one */
                if data.contains(CanonicalKey::VolumeL) {
                    debug!("Volume already set, ignoring '{unit}'");
                    continue;
                }
                data.insert(CanonicalKey::VolumeM3, value / m3_divisor);
                data.insert(CanonicalKey::VolumeL, value * l_factor);
            },
            None => {
                trace!("Ignoring unknown unit '{unit}'");
            }
        }
    }

    return data;
}

/// Lowercase, collapse whitespace runs and trim.
pub fn normalize(s: &str) -> String {
    return s.split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase();
}

/// Only instantaneous values of storage 0 are forwarded, everything else is history.
pub fn is_current(rec: &RawRecord) -> bool {
    let storage = normalize(rec.storage.as_deref().unwrap_or("-"));
    let function = normalize(rec.function.as_deref().unwrap_or(""));

    let live_storage = matches!(storage.as_str(), "0" | "-" | "");
    let live_function = function.contains("instantaneous") || function.is_empty() || function == "-";

    return live_storage && live_function;
}

fn parse_value(value: Option<&str>) -> Option<f64> {
    let v = value?.trim().parse::<f64>().ok()?;
    if !v.is_finite() {
        return None;
    }
    return Some(v);
}

fn classify_unit(unit: &str) -> Option<UnitRule> {
    if unit.starts_with("energy") {
        if unit.contains("(100 wh)") {
            return Some(UnitRule::Energy(0.1));
        }
        if unit.contains("(kwh)") {
            return Some(UnitRule::Energy(1.0));
        }
        if unit.contains("(mwh)") {
            return Some(UnitRule::Energy(1000.0));
        }
        return None;
    }

    if unit.contains("flow temperature") {
        return Some(UnitRule::FlowTemperature);
    }
    if unit.contains("return temperature") {
        return Some(UnitRule::ReturnTemperature);
    }
    if unit.contains("temperature difference") {
        return Some(UnitRule::TemperatureDifference);
    }

    if unit.starts_with("power") {
        return Some(UnitRule::Power);
    }

    if unit.contains("volume flow") {
        return Some(UnitRule::VolumeFlow);
    }

    if unit.starts_with("volume") {
        if unit.contains("(m m^3)") {
            return Some(UnitRule::Volume { m3_divisor: 1000.0, l_factor: 1.0 });
        }
        if unit.contains("(1e-2 m^3)") {
            return Some(UnitRule::Volume { m3_divisor: 100.0, l_factor: 10.0 });
        }
    }

    return None;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(unit: &str, value: &str, function: &str, storage: &str) -> RawRecord {
        return RawRecord {
            unit: Some(unit.to_string()),
            value: Some(value.to_string()),
            function: Some(function.to_string()),
            storage: Some(storage.to_string()),
        };
    }

    fn current(unit: &str, value: &str) -> RawRecord {
        return record(unit, value, "Instantaneous value", "0");
    }

    fn wrap(records: &str) -> String {
        return format!("<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<MBusData>{records}</MBusData>");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Volume (1e-2   m^3) "), "volume (1e-2 m^3)");
        assert_eq!(normalize("Energy\t(kWh)"), "energy (kwh)");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_current_classification() {
        assert!(is_current(&record("Energy (kWh)", "1", "Instantaneous value", "0")));
        assert!(!is_current(&record("Energy (kWh)", "1", "Instantaneous value", "1")));
        assert!(!is_current(&record("Energy (kWh)", "1", "Instantaneous value", "12")));
        assert!(is_current(&record("Energy (kWh)", "1", "", "-")));
        assert!(is_current(&record("Energy (kWh)", "1", "-", "")));
        assert!(!is_current(&record("Energy (kWh)", "1", "Maximum value", "0")));
        assert!(!is_current(&record("Energy (kWh)", "1", "Value during error state", "0")));

        /* Missing storage number counts as current */
        let rec = RawRecord {
            unit: Some("Energy (kWh)".to_string()),
            value: Some("1".to_string()),
            function: None,
            storage: None,
        };
        assert!(is_current(&rec));
    }

    #[test]
    fn test_energy_units() {
        let data = interpret_records(&[current("Energy (100 Wh)", "1000")]);
        assert_eq!(data.get(CanonicalKey::EnergyKwh), Some(100.0));

        let data = interpret_records(&[current("Energy (kWh)", "4711")]);
        assert_eq!(data.get(CanonicalKey::EnergyKwh), Some(4711.0));

        let data = interpret_records(&[current("Energy (MWh)", "2.5")]);
        assert_eq!(data.get(CanonicalKey::EnergyKwh), Some(2500.0));

        /* Unknown energy scale does not fall through to other rules */
        let data = interpret_records(&[current("Energy (J)", "1")]);
        assert!(data.is_empty());
    }

    #[test]
    fn test_temperatures() {
        let data = interpret_records(&[
            current("Flow Temperature", "6543"),
            current("Return temperature (1e-2 deg C)", "4210"),
            current("Temperature Difference (1e-2  deg C)", "2333"),
        ]);
        assert_eq!(data.get(CanonicalKey::TempFlowC), Some(65.43));
        assert_eq!(data.get(CanonicalKey::TempReturnC), Some(42.1));
        assert_eq!(data.get(CanonicalKey::DeltaTC), Some(23.33));
    }

    #[test]
    fn test_power_and_flow() {
        let data = interpret_records(&[
            current("Power (100 W)", "125"),
            current("Volume flow (m m^3/h)", "840"),
        ]);
        assert_eq!(data.get(CanonicalKey::PowerKw), Some(12.5));
        assert_eq!(data.get(CanonicalKey::FlowLh), Some(840.0));
    }

    #[test]
    fn test_power_scale_ignores_qualifier() {
        /* Known simplification: every power unit is treated as 100 W steps */
        let data = interpret_records(&[current("Power (W)", "1500")]);
        assert_eq!(data.get(CanonicalKey::PowerKw), Some(150.0));
    }

    #[test]
    fn test_volume_units() {
        let data = interpret_records(&[current("Volume (1e-2 m^3)", "250")]);
        assert_eq!(data.get(CanonicalKey::VolumeM3), Some(2.5));
        assert_eq!(data.get(CanonicalKey::VolumeL), Some(2500.0));

        let data = interpret_records(&[current("Volume (m m^3)", "12500")]);
        assert_eq!(data.get(CanonicalKey::VolumeM3), Some(12.5));
        assert_eq!(data.get(CanonicalKey::VolumeL), Some(12500.0));
    }

    #[test]
    fn test_only_first_volume_is_used() {
        let data = interpret_records(&[
            current("Volume (m m^3)", "12500"),
            current("Volume (1e-2 m^3)", "1300"),
        ]);
        assert_eq!(data.get(CanonicalKey::VolumeM3), Some(12.5));
        assert_eq!(data.get(CanonicalKey::VolumeL), Some(12500.0));

        let data = interpret_records(&[
            current("Volume (1e-2 m^3)", "1300"),
            current("Volume (m m^3)", "12500"),
        ]);
        assert_eq!(data.get(CanonicalKey::VolumeM3), Some(13.0));
        assert_eq!(data.get(CanonicalKey::VolumeL), Some(13000.0));
    }

    #[test]
    fn test_historic_volume_does_not_block_current() {
        let data = interpret_records(&[
            record("Volume (m m^3)", "9000", "Instantaneous value", "1"),
            current("Volume (m m^3)", "12500"),
        ]);
        assert_eq!(data.get(CanonicalKey::VolumeL), Some(12500.0));
    }

    #[test]
    fn test_invalid_values_are_skipped() {
        let data = interpret_records(&[
            current("Energy (kWh)", "n/a"),
            current("Energy (kWh)", ""),
            current("Energy (kWh)", "NaN"),
            current("Flow Temperature", " 6000 "),
            RawRecord { unit: Some("Power (100 W)".to_string()), ..Default::default() },
        ]);
        assert_eq!(data.len(), 1);
        assert_eq!(data.get(CanonicalKey::TempFlowC), Some(60.0));
    }

    #[test]
    fn test_last_record_wins_for_same_key() {
        let data = interpret_records(&[
            current("Energy (kWh)", "10"),
            current("Energy (MWh)", "0.5"),
        ]);
        assert_eq!(data.get(CanonicalKey::EnergyKwh), Some(500.0));
    }

    #[test]
    fn test_unknown_units_are_ignored() {
        let data = interpret_records(&[
            current("Fabrication number", "67434"),
            current("Time Point (time & date)", "2024-01-01T00:00:00"),
            current("Energy (kWh)", "1"),
        ]);
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_interpret_xml() {
        let xml = wrap(r#"
    <SlaveInformation><Id>1</Id><Manufacturer>KAM</Manufacturer></SlaveInformation>
    <DataRecord id="0">
        <Function>Instantaneous value</Function>
        <StorageNumber>0</StorageNumber>
        <Unit>Energy (100 Wh)</Unit>
        <Value>1000</Value>
    </DataRecord>
    <DataRecord id="1">
        <Function>Instantaneous value</Function>
        <StorageNumber>0</StorageNumber>
        <Unit>Volume (1e-2  m^3)</Unit>
        <Value>250</Value>
    </DataRecord>
    <DataRecord id="2">
        <Function>Instantaneous value</Function>
        <StorageNumber>1</StorageNumber>
        <Unit>Energy (100 Wh)</Unit>
        <Value>900</Value>
    </DataRecord>"#);

        let data = interpret(&xml).unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data.get(CanonicalKey::EnergyKwh), Some(100.0));
        assert_eq!(data.get(CanonicalKey::VolumeM3), Some(2.5));
        assert_eq!(data.get(CanonicalKey::VolumeL), Some(2500.0));
        assert_eq!(data.to_json().unwrap(), r#"{"energy_kwh":100.0,"volume_m3":2.5,"volume_l":2500.0}"#);
    }

    #[test]
    fn test_interpret_empty_document() {
        let data = interpret(&wrap("")).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_interpret_malformed() {
        assert!(interpret("error: failed to receive M-Bus response frame").is_err());
    }
}
