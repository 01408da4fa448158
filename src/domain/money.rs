//! Lenient decimal parsing for third-party JSON, where amounts arrive either
//! as numbers (`150.0`) or strings (`"150.00"`).

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn decimal_from_json(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        Value::String(s) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

pub fn deserialize_decimal<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    decimal_from_json(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid decimal amount: {}", value)))
}

pub fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => decimal_from_json(&v)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid decimal amount: {}", v))),
    }
}

/// Converts an integer amount in minor units (cents) to a decimal.
pub fn from_minor_units(minor: i64) -> BigDecimal {
    BigDecimal::new(minor.into(), 2)
}
