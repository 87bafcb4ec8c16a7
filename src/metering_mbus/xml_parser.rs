use super::structs::{MbusResponse, RawRecord, SlaveInformation};
use super::ParseError;
use log::debug;
use roxmltree::{Document, Node};

// Example output of mbus-serial-request-data:
// <MBusData>
//     <SlaveInformation>
//         <Id>12345678</Id>
//         <Manufacturer>KAM</Manufacturer>
//         <Version>52</Version>
//         <ProductName>Kamstrup Multical 602</ProductName>
//         <Medium>Heat: Outlet</Medium>
//     </SlaveInformation>
//     <DataRecord id="0">
//         <Function>Instantaneous value</Function>
//         <StorageNumber>0</StorageNumber>
//         <Unit>Energy (kWh)</Unit>
//         <Value>12345</Value>
//     </DataRecord>
// </MBusData>

pub fn parse_response(xml: &str) -> Result<MbusResponse, ParseError> {
    let doc = Document::parse(xml)?;

    let slave = doc.descendants()
        .find(|n| n.has_tag_name("SlaveInformation"))
        .map(|n| SlaveInformation {
            id: child_text(n, "Id"),
            manufacturer: child_text(n, "Manufacturer"),
            version: child_text(n, "Version"),
            product_name: child_text(n, "ProductName"),
            medium: child_text(n, "Medium"),
        });

    /* Records may be nested, e.g. in multi telegram responses */
    let records: Vec<RawRecord> = doc.descendants()
        .filter(|n| n.has_tag_name("DataRecord"))
        .map(|n| RawRecord {
            unit: child_text(n, "Unit"),
            value: child_text(n, "Value"),
            function: child_text(n, "Function"),
            storage: child_text(n, "StorageNumber"),
        })
        .collect();

    debug!("Parsed {} data records, slave information present: {}", records.len(), slave.is_some());

    return Ok(MbusResponse { slave, records });
}

/// Text of the first direct child named `name`, an empty element yields `Some("")`.
fn child_text(node: Node, name: &str) -> Option<String> {
    return node.children()
        .find(|c| c.has_tag_name(name))
        .map(|c| c.text().unwrap_or("").to_string());
}
