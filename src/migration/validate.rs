//! Structural checks on migrated records.
//!
//! The record type is guessed from a marker field; each type has a pair of
//! key fields that must survive the migration.

use serde_json::Value;

/// Marker field and the key fields it implies
const KEY_FIELDS: &[(&str, &[&str])] = &[
    ("projectName", &["projectName", "clientInfo"]),
    ("employeeName", &["employeeName", "position"]),
    ("itemName", &["itemName", "quantity"]),
    ("equipmentName", &["equipmentName", "status"]),
    ("vendorName", &["vendorName", "amount"]),
    ("incidentType", &["incidentType", "date"]),
    ("requestNumber", &["requestNumber", "items"]),
];

/// Key fields for a record, empty when the type is not recognised
pub fn key_fields_for(record: &Value) -> &'static [&'static str] {
    KEY_FIELDS
        .iter()
        .find(|(marker, _)| record.get(*marker).is_some())
        .map(|(_, fields)| *fields)
        .unwrap_or(&[])
}

/// Compare original records with their migrated counterparts
///
/// Returns one message per discrepancy; an empty list means the migration
/// looks complete.
pub fn validate_migration(original: &[Value], migrated: &[Value]) -> Vec<String> {
    let mut discrepancies = Vec::new();

    if original.len() != migrated.len() {
        discrepancies.push(format!(
            "Record count mismatch: {} original, {} migrated",
            original.len(),
            migrated.len()
        ));
    }

    for (index, record) in original.iter().enumerate() {
        let Some(copy) = migrated.get(index).filter(|copy| !copy.is_null()) else {
            discrepancies.push(format!("Record {} missing after migration", index));
            continue;
        };

        for field in key_fields_for(record) {
            match (record.get(*field), copy.get(*field)) {
                (Some(_), None) => {
                    discrepancies.push(format!("Record {} lost key field '{}'", index, field));
                }
                (Some(expected), Some(actual)) if expected != actual => {
                    discrepancies.push(format!("Record {} changed key field '{}'", index, field));
                }
                _ => {}
            }
        }
    }

    discrepancies
}
