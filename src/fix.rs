//! Validation of decoded data-channel records into [`Fix`] values.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// One validated positioning sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub bearing: Option<f64>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Why a record was not accepted as a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixRejection {
    MissingLatitude,
    MissingLongitude,
    NonNumericCoordinate,
    LatitudeOutOfRange,
    LongitudeOutOfRange,
}

impl fmt::Display for FixRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FixRejection::MissingLatitude => "missing latitude",
            FixRejection::MissingLongitude => "missing longitude",
            FixRejection::NonNumericCoordinate => "coordinate is not a finite number",
            FixRejection::LatitudeOutOfRange => "latitude outside [-90, 90]",
            FixRejection::LongitudeOutOfRange => "longitude outside [-180, 180]",
        };
        f.write_str(text)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// Validate a decoded record. `now_ms` stands in for a missing timestamp.
pub fn validate_fix(record: &Map<String, Value>, now_ms: i64) -> Result<Fix, FixRejection> {
    let latitude = coordinate(record, "latitude", FixRejection::MissingLatitude)?;
    let longitude = coordinate(record, "longitude", FixRejection::MissingLongitude)?;
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(FixRejection::LatitudeOutOfRange);
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(FixRejection::LongitudeOutOfRange);
    }

    let accuracy = finite_number(record, "accuracy").filter(|value| *value >= 0.0);
    let bearing = finite_number(record, "bearing");
    let timestamp = finite_number(record, "timestamp")
        .map(|value| value.trunc() as i64)
        .unwrap_or(now_ms);

    Ok(Fix {
        latitude,
        longitude,
        accuracy,
        bearing,
        timestamp,
    })
}

fn coordinate(
    record: &Map<String, Value>,
    key: &str,
    missing: FixRejection,
) -> Result<f64, FixRejection> {
    match record.get(key) {
        None | Some(Value::Null) => Err(missing),
        Some(value) => value
            .as_f64()
            .filter(|number| number.is_finite())
            .ok_or(FixRejection::NonNumericCoordinate),
    }
}

fn finite_number(record: &Map<String, Value>, key: &str) -> Option<f64> {
    record
        .get(key)
        .and_then(Value::as_f64)
        .filter(|number| number.is_finite())
}
