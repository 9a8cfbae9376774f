//! Shared helpers for command handlers.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::CliError;

/// Parse a JSON object given inline (`--data`) or as a file (`--file`).
pub fn read_json_object(data: Option<&str>, file: Option<&Path>) -> Result<Map<String, Value>, CliError> {
    let (field, text) = match (data, file) {
        (Some(inline), _) => ("data", inline.to_owned()),
        (None, Some(path)) => ("file", std::fs::read_to_string(path)?),
        (None, None) => {
            return Err(CliError::Validation {
                field: "data".into(),
                reason: "pass --data JSON or --file PATH".into(),
            });
        }
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CliError::Validation {
            field: field.into(),
            reason: "a config section must be a JSON object".into(),
        }),
        Err(e) => Err(CliError::Validation {
            field: field.into(),
            reason: format!("invalid JSON: {e}"),
        }),
    }
}

/// `3d 4h 12m`, `4h 0m`, `12m`.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let minutes = secs % 3_600 / 60;
    match (days, hours) {
        (0, 0) => format!("{minutes}m"),
        (0, _) => format!("{hours}h {minutes}m"),
        _ => format!("{days}d {hours}h {minutes}m"),
    }
}

/// Binary units with one decimal: `190.7 MiB`.
#[allow(clippy::as_conversions, clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS.get(unit).copied().unwrap_or("B"))
    }
}
