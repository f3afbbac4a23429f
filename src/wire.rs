use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone as _, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::reading::Reading;

/// Largest datagram payload accepted by [`decode`].
pub const MAX_PAYLOAD_LEN: usize = 1024;

const SENSOR_ID_KEY: &str = "sensor_id";
const GROUP_KEY: &str = "group";
const VALUE_KEY: &str = "value";
const UNIT_KEY: &str = "unit";
const ISO_TIMESTAMP_KEY: &str = "ts";
const EPOCH_TIMESTAMP_KEY: &str = "timestamp";

/// Which of the two timestamp encodings a payload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    /// `ts`: RFC 3339 string
    #[default]
    Iso8601,
    /// `timestamp`: integer Unix seconds
    UnixSeconds,
}

impl TimestampFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampFormat::Iso8601 => "iso",
            TimestampFormat::UnixSeconds => "epoch",
        }
    }
}

impl FromStr for TimestampFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iso" => Ok(TimestampFormat::Iso8601),
            "epoch" => Ok(TimestampFormat::UnixSeconds),
            _ => bail!("unknown timestamp format: {}", s),
        }
    }
}

pub fn decode(raw: &[u8]) -> Result<Reading, DecodeError> {
    if raw.len() > MAX_PAYLOAD_LEN {
        return Err(DecodeError::Malformed(format!(
            "payload too long: expected at most {MAX_PAYLOAD_LEN} bytes, got {}",
            raw.len()
        )));
    }

    let text = std::str::from_utf8(raw)?;

    let object = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            return Err(DecodeError::Malformed(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            )));
        }
        Err(e) => return Err(DecodeError::Malformed(e.to_string())),
    };

    let sensor_id = required_str(&object, SENSOR_ID_KEY)?.to_owned();
    let value = required_f64(&object, VALUE_KEY)?;
    let unit = required_str(&object, UNIT_KEY)?.to_owned();
    let group = optional_str(&object, GROUP_KEY)?.map(str::to_owned);
    let timestamp = decode_timestamp(&object)?;

    Ok(Reading {
        sensor_id,
        group,
        value,
        unit,
        timestamp,
    })
}

#[derive(Serialize)]
struct Payload<'a> {
    sensor_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<&'a str>,
    value: f64,
    unit: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
}

/// Encodes a reading into the JSON payload that [`decode`] accepts.
///
/// `UnixSeconds` drops sub-second precision.
pub fn encode(reading: &Reading, format: TimestampFormat) -> serde_json::Result<Vec<u8>> {
    let (ts, timestamp) = match format {
        TimestampFormat::Iso8601 => (
            Some(reading.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None,
        ),
        TimestampFormat::UnixSeconds => (None, Some(reading.timestamp.timestamp())),
    };

    serde_json::to_vec(&Payload {
        sensor_id: &reading.sensor_id,
        group: reading.group.as_deref(),
        value: reading.value,
        unit: &reading.unit,
        ts,
        timestamp,
    })
}

fn required_str<'a>(object: &'a Map<String, Value>, key: &'static str) -> Result<&'a str, DecodeError> {
    match object.get(key) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(key)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(DecodeError::TypeMismatch {
            field: key,
            expected: "string",
        }),
    }
}

fn optional_str<'a>(
    object: &'a Map<String, Value>,
    key: &'static str,
) -> Result<Option<&'a str>, DecodeError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(DecodeError::TypeMismatch {
            field: key,
            expected: "string",
        }),
    }
}

fn required_f64(object: &Map<String, Value>, key: &'static str) -> Result<f64, DecodeError> {
    match object.get(key) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(key)),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| {
            DecodeError::Malformed(format!("{key} is not representable as f64: {n}"))
        }),
        Some(_) => Err(DecodeError::TypeMismatch {
            field: key,
            expected: "number",
        }),
    }
}

fn decode_timestamp(object: &Map<String, Value>) -> Result<DateTime<Utc>, DecodeError> {
    match object.get(ISO_TIMESTAMP_KEY) {
        Some(Value::String(s)) => return parse_iso_timestamp(s),
        Some(Value::Null) | None => {}
        Some(_) => {
            return Err(DecodeError::TypeMismatch {
                field: ISO_TIMESTAMP_KEY,
                expected: "string",
            });
        }
    }

    match object.get(EPOCH_TIMESTAMP_KEY) {
        Some(Value::Number(n)) => {
            let Some(secs) = n.as_i64() else {
                if n.is_u64() {
                    return Err(DecodeError::Malformed(format!(
                        "{EPOCH_TIMESTAMP_KEY} out of range: {n}"
                    )));
                }
                return Err(DecodeError::TypeMismatch {
                    field: EPOCH_TIMESTAMP_KEY,
                    expected: "integer",
                });
            };
            Utc.timestamp_opt(secs, 0).single().ok_or_else(|| {
                DecodeError::Malformed(format!("{EPOCH_TIMESTAMP_KEY} out of range: {secs}"))
            })
        }
        Some(Value::Null) | None => Err(DecodeError::MissingField(ISO_TIMESTAMP_KEY)),
        Some(_) => Err(DecodeError::TypeMismatch {
            field: EPOCH_TIMESTAMP_KEY,
            expected: "integer",
        }),
    }
}

fn parse_iso_timestamp(s: &str) -> Result<DateTime<Utc>, DecodeError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Offset-less timestamps are taken as UTC.
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| DecodeError::Malformed(format!("invalid {ISO_TIMESTAMP_KEY}: {s}: {e}")))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
