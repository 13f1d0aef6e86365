use serde_json::Value;

use crate::error::{ParseError, PollError, ValidationError};
use crate::types::{DeviceDoc, Metadata, NormalizedRecord};

const SERIAL_FIELD: &str = "ssn";

/// Fields never passed through to the broker. Model, firmware and brand are
/// carried in the metadata instead.
pub const STRIPPED_FIELDS: [&str; 7] = [
    "thresholds",
    "dealer",
    "location",
    "dummy",
    "fwVersion",
    "dsn",
    "brand",
];

pub fn parse(raw: &[u8]) -> Result<Value, ParseError> {
    Ok(serde_json::from_slice(raw)?)
}

/// Picks the first device. Only one device per account is supported.
pub fn select_device(parsed: Value) -> Result<Value, ParseError> {
    match parsed {
        Value::Array(entries) => entries.into_iter().next().ok_or(ParseError::EmptyList),
        doc @ Value::Object(_) => Ok(doc),
        _ => Err(ParseError::EmptyList),
    }
}

pub fn validate(doc: Value) -> Result<DeviceDoc, ValidationError> {
    let Value::Object(doc) = doc else {
        return Err(ValidationError::MissingIdentifier);
    };
    match doc.get(SERIAL_FIELD) {
        Some(Value::String(serial)) if !serial.is_empty() => Ok(doc),
        _ => Err(ValidationError::MissingIdentifier),
    }
}

pub fn normalize(mut doc: DeviceDoc) -> (NormalizedRecord, Metadata) {
    let mut metadata = Metadata::new();
    metadata.insert(
        "SERIAL".to_string(),
        field_text(&doc, SERIAL_FIELD).replace('/', "_"),
    );
    metadata.insert("MODEL".to_string(), field_text(&doc, "dsn"));
    metadata.insert("SWVER".to_string(), field_text(&doc, "fwVersion"));
    metadata.insert("BRAND".to_string(), field_text(&doc, "brand"));

    for field in STRIPPED_FIELDS {
        doc.remove(field);
    }
    (NormalizedRecord(doc), metadata)
}

/// Runs the whole pipeline on one raw response body.
pub fn transform(raw: &[u8]) -> Result<(NormalizedRecord, Metadata), PollError> {
    let device = select_device(parse(raw)?)?;
    let doc = validate(device)?;
    Ok(normalize(doc))
}

fn field_text(doc: &DeviceDoc, key: &str) -> String {
    match doc.get(key) {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    }
}
