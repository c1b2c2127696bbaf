//! The comparable payload value domain
//!
//! Every event field a guard ever inspects is normalized into a `Value`.
//! Comparison is within-variant only; a number never equals or orders
//! against a text value, so heterogeneous payloads simply fail to match
//! instead of raising.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::ThingStatus;

/// A single observed or specified payload value
///
/// The untagged serde representation accepts `null`, booleans, numbers,
/// `"HH:MM:SS"` times, upper-case thing status names, and arbitrary text,
/// tried in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    None,
    Bool(bool),
    Number(f64),
    Time(NaiveTime),
    Status(ThingStatus),
    Text(String),
}

impl Value {
    /// Whether this value belongs to a cyclic (wrap-capable) domain
    ///
    /// Time-of-day is the one wrap-capable domain: a range whose end
    /// precedes its start spans midnight.
    pub fn wraps(&self) -> bool {
        matches!(self, Value::Time(_))
    }

    /// A short name of the variant, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Time(_) => "time",
            Value::Status(_) => "status",
            Value::Text(_) => "text",
        }
    }

    /// Construct a time-of-day value
    ///
    /// Returns None for out-of-range components.
    pub fn time(hour: u32, min: u32, sec: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, min, sec).map(Value::Time)
    }
}

impl PartialOrd for Value {
    /// Within-variant ordering for numbers, times, and text; undefined
    /// across variants.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ if self == other => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            Value::Status(s) => write!(f, "{}", s),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Value::Time(t)
    }
}

impl From<ThingStatus> for Value {
    fn from(s: ThingStatus) -> Self {
        Value::Status(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_variant_ordering() {
        assert!(Value::Number(1.0) < Value::Number(2.0));
        assert!(Value::from("a") < Value::from("b"));
        assert!(Value::time(8, 0, 0).unwrap() < Value::time(9, 0, 0).unwrap());
    }

    #[test]
    fn test_cross_variant_comparison_undefined() {
        assert_eq!(Value::Number(5.0).partial_cmp(&Value::from("5")), None);
        assert_ne!(Value::Number(5.0), Value::from("5"));
    }

    #[test]
    fn test_wrap_capable_domains() {
        assert!(Value::time(23, 0, 0).unwrap().wraps());
        assert!(!Value::Number(3.0).wraps());
        assert!(!Value::from("ON").wraps());
    }

    #[test]
    fn test_untagged_deserialization() {
        assert_eq!(serde_json::from_str::<Value>("null").unwrap(), Value::None);
        assert_eq!(
            serde_json::from_str::<Value>("true").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            serde_json::from_str::<Value>("21.5").unwrap(),
            Value::Number(21.5)
        );
        assert_eq!(
            serde_json::from_str::<Value>("\"08:30:00\"").unwrap(),
            Value::time(8, 30, 0).unwrap()
        );
        assert_eq!(
            serde_json::from_str::<Value>("\"ONLINE\"").unwrap(),
            Value::Status(ThingStatus::Online)
        );
        assert_eq!(
            serde_json::from_str::<Value>("\"ON\"").unwrap(),
            Value::from("ON")
        );
    }
}
