//! Extraction helpers for the free-form experiment parameter map.
//!
//! Numeric parameters arrive as JSON numbers (often floats from wire
//! decoding) and are truncated to integers before range checking.

use serde_json::{Map, Value};

use crate::error::{ChaosError, ChaosResult};

/// Integer parameter with a default and an inclusive range.
pub fn int_param(
    params: &Map<String, Value>,
    key: &str,
    default: i64,
    min: i64,
    max: i64,
) -> ChaosResult<i64> {
    let value = match params.get(key) {
        None => default,
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(default),
        Some(_) => default,
    };
    if value < min || value > max {
        return Err(ChaosError::Config(format!(
            "{key} must be {min}-{max}, got {value}"
        )));
    }
    Ok(value)
}

/// String parameter falling back to a default when absent or non-string.
pub fn string_param(params: &Map<String, Value>, key: &str, default: &str) -> String {
    match params.get(key) {
        Some(Value::String(s)) => s.clone(),
        _ => default.to_string(),
    }
}

/// String parameter that must be present and non-empty.
pub fn required_string_param(params: &Map<String, Value>, key: &str) -> ChaosResult<String> {
    match params.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(ChaosError::Config(format!("{key} is required"))),
    }
}

/// String-list parameter. Heterogeneous arrays are accepted with
/// non-string items dropped.
pub fn string_list_param(params: &Map<String, Value>, key: &str) -> Vec<String> {
    match params.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
