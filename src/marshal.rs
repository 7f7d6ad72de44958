//! Conversions from host values into native arguments.
//!
//! Host runtimes hand over loosely typed values. Everything here either
//! produces an exact native value or an argument error; nothing is rounded,
//! truncated or wrapped.

use serde_json::Value;

use crate::engine::Key;
use crate::error::{AnnBridgeError, Result};

/// Largest integer a double represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Convert a host number into an unsigned integer without loss.
///
/// Integral doubles such as `3.0` are accepted; fractional, negative,
/// non-finite and out-of-range numbers are not.
pub fn lossless_u64(value: &Value) -> Option<u64> {
    let number = value.as_number()?;
    if let Some(integer) = number.as_u64() {
        return Some(integer);
    }
    if number.is_i64() {
        return None;
    }
    let float = number.as_f64()?;
    if float.is_finite() && float >= 0.0 && float.fract() == 0.0 && float <= MAX_SAFE_INTEGER {
        Some(float as u64)
    } else {
        None
    }
}

/// Convert a host number into a `usize`, failing with `message` otherwise.
pub fn to_usize(value: &Value, message: &str) -> Result<usize> {
    lossless_u64(value)
        .and_then(|integer| usize::try_from(integer).ok())
        .ok_or_else(|| AnnBridgeError::invalid_argument(message))
}

/// Convert a host number into a key, failing with `message` otherwise.
pub fn to_key(value: &Value, message: &str) -> Result<Key> {
    lossless_u64(value).ok_or_else(|| AnnBridgeError::invalid_argument(message))
}

/// Convert a host array of numbers into a float vector.
///
/// Components beyond the `f32` range are rejected rather than saturated to
/// infinity.
pub fn to_vector(value: &Value) -> Result<Vec<f32>> {
    let items = value.as_array().ok_or_else(|| {
        AnnBridgeError::invalid_argument("Vectors must be arrays of numbers")
    })?;

    items
        .iter()
        .map(|item| {
            let component = item
                .as_f64()
                .ok_or_else(|| AnnBridgeError::invalid_argument("Vectors must be arrays of numbers"))?;
            let narrowed = component as f32;
            if component.is_finite() && !narrowed.is_finite() {
                return Err(AnnBridgeError::invalid_argument(format!(
                    "Vector component {component} is out of the float32 range"
                )));
            }
            Ok(narrowed)
        })
        .collect()
}

/// Borrow a host string, failing with `message` otherwise.
pub fn to_str<'a>(value: &'a Value, message: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| AnnBridgeError::invalid_argument(message))
}

/// Extract the single non-empty path argument of save/load/view.
pub fn to_path(args: &[Value]) -> Result<&str> {
    const USAGE: &str = "Function expects a string path argument";

    match args {
        [Value::String(path)] if !path.is_empty() => Ok(path.as_str()),
        _ => Err(AnnBridgeError::invalid_argument(USAGE)),
    }
}
