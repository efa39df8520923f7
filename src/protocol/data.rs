use serde_json::{Map, Value};

use super::snippet;

/// Classification of one data-channel line.
#[derive(Debug, Clone, PartialEq)]
pub enum DataLine {
    Record(Map<String, Value>),
    Blank,
    ParseError(String),
}

/// Decode a data-channel line as a JSON object. Never fails hard.
pub fn decode_data_line(line: &str) -> DataLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return DataLine::Blank;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => DataLine::Record(map),
        Ok(_) | Err(_) => DataLine::ParseError(snippet(trimmed)),
    }
}
