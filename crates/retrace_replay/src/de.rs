//! Lenient field decoders for recorder output.
//!
//! The recorder stringifies most numbers, and a `null` value means something
//! different from a missing one.

use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

/// Keep an explicit `null` as `Some(Null)`; a missing key stays `None`
///
/// # Errors
///
/// Propagates deserializer errors
pub fn present<'de, D>(deserializer: D) -> Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Integer from a JSON number or numeric text
///
/// # Errors
///
/// Returns error if the text is not a number
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<NumberOrText>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(NumberOrText::Int(v)) => Ok(Some(v)),
        #[allow(clippy::cast_possible_truncation)]
        Some(NumberOrText::Float(v)) => Ok(Some(v as i64)),
        Some(NumberOrText::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("expected integer, got {s:?}: {e}"))),
    }
}

/// Float from a JSON number or numeric text
///
/// # Errors
///
/// Returns error if the text is not a number
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<NumberOrText>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        #[allow(clippy::cast_precision_loss)]
        Some(NumberOrText::Int(v)) => Ok(Some(v as f64)),
        Some(NumberOrText::Float(v)) => Ok(Some(v)),
        Some(NumberOrText::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("expected number, got {s:?}: {e}"))),
    }
}
