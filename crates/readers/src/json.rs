//! JSON array-of-objects reader

use std::collections::BTreeMap;
use std::io::Read;

use serde_json::Value as JsonValue;

use restable_core::{AttributeKind, Error, Record, ResourceType, Result, Value};
use restable_index::ResourceSchema;

use crate::{RecordStream, ResourceReader};

/// Reads a JSON array whose elements are objects, one record per object
///
/// Object fields are converted by the declared attribute kinds; keys that are
/// not declared attributes are ignored and `null` leaves the attribute unset.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReader;

impl JsonReader {
    /// Create the reader
    pub fn new() -> Self {
        JsonReader
    }
}

impl ResourceReader for JsonReader {
    fn format(&self) -> &str {
        "json"
    }

    fn read(&self, input: Box<dyn Read + Send>, schema: &ResourceSchema) -> Result<RecordStream> {
        let resource = schema.resource_type().clone();
        let document: JsonValue = serde_json::from_reader(input).map_err(|e| {
            Error::decode(
                resource.name(),
                format!("line {} column {}", e.line(), e.column()),
                e.to_string(),
            )
        })?;
        let JsonValue::Array(items) = document else {
            return Err(Error::decode(
                resource.name(),
                "top level",
                "expected an array of objects",
            ));
        };

        let kinds: BTreeMap<String, AttributeKind> = schema
            .attributes()
            .iter()
            .map(|a| (a.name().to_string(), a.kind()))
            .collect();

        let records = items
            .into_iter()
            .enumerate()
            .map(move |(position, item)| to_record(&resource, &kinds, position, item));
        Ok(Box::new(records))
    }
}

fn to_record(
    resource: &ResourceType,
    kinds: &BTreeMap<String, AttributeKind>,
    position: usize,
    item: JsonValue,
) -> Result<Record> {
    let location = || format!("element {}", position);
    let JsonValue::Object(fields) = item else {
        return Err(Error::decode(resource.name(), location(), "element is not an object"));
    };

    let mut record = Record::new(resource.clone());
    for (name, raw) in fields {
        let Some(kind) = kinds.get(&name) else {
            continue;
        };
        let value = kind.coerce(Value::from(raw)).map_err(|reason| {
            Error::decode(resource.name(), location(), format!("{}: {}", name, reason))
        })?;
        record.set(name, value);
    }
    Ok(record)
}
