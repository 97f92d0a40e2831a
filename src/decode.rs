use serde::Deserialize;
use serde_json::Value;

use crate::error::DecodeError;
use crate::models::AttendanceRecord;

/// Turns a query snapshot into records, rejecting the whole snapshot if any
/// entry is malformed.
pub fn decode_snapshot(snapshot: &Value) -> Result<Vec<AttendanceRecord>, DecodeError> {
    match snapshot {
        Value::Null => Ok(Vec::new()),
        Value::Object(entries) => entries
            .iter()
            .map(|(key, value)| decode_record(key, value))
            .collect(),
        Value::Array(entries) => entries
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.is_null())
            .map(|(index, value)| decode_record(&index.to_string(), value))
            .collect(),
        Value::Bool(_) => Err(DecodeError::UnexpectedShape("boolean")),
        Value::Number(_) => Err(DecodeError::UnexpectedShape("number")),
        Value::String(_) => Err(DecodeError::UnexpectedShape("string")),
    }
}

fn decode_record(key: &str, value: &Value) -> Result<AttendanceRecord, DecodeError> {
    AttendanceRecord::deserialize(value).map_err(|err| DecodeError::InvalidRecord {
        key: key.to_string(),
        message: err.to_string(),
    })
}
