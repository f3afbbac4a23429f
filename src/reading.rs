use chrono::{DateTime, Utc};

/// One decoded sensor sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sensor_id: String,

    pub group: Option<String>,

    pub value: f64,

    pub unit: String,

    pub timestamp: DateTime<Utc>,
}
