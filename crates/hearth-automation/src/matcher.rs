//! Value matchers
//!
//! A Matcher is a pure predicate over a single observed value: no
//! constraint, an exact value, an inclusive or half-open range, or an
//! arbitrary predicate function. Matchers are built once at rule
//! registration and never mutate.

use hearth_core::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Predicate function over an observed value
pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Declarative value constraint, as written in trigger configuration
///
/// A bare value means "exactly this"; an object with `lo`/`hi` bounds
/// means a range. Predicates exist only in the code-level API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSpec {
    Range(RangeSpec),
    Single(Value),
}

/// Range bounds as written in trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeSpec {
    pub lo: Value,
    pub hi: Value,
    #[serde(default)]
    pub exclusive_end: bool,
}

/// Membership strategy, fixed when the range is constructed
///
/// A range whose end precedes its start in a wrap-capable domain (a
/// time-of-day window spanning midnight) is cyclic; everything else is
/// linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeStrategy {
    Linear,
    Cyclic,
}

/// A compiled range constraint
#[derive(Debug, Clone)]
pub struct RangeMatcher {
    lo: Value,
    hi: Value,
    exclusive_end: bool,
    strategy: RangeStrategy,
}

impl RangeMatcher {
    /// Build a range, selecting linear or cyclic membership
    pub fn new(lo: Value, hi: Value, exclusive_end: bool) -> Self {
        let strategy = match lo.partial_cmp(&hi) {
            Some(Ordering::Greater) if lo.wraps() => RangeStrategy::Cyclic,
            _ => RangeStrategy::Linear,
        };
        Self {
            lo,
            hi,
            exclusive_end,
            strategy,
        }
    }

    /// Whether `observed` falls inside the range
    ///
    /// Values that do not order against the bounds never match.
    pub fn matches(&self, observed: &Value) -> bool {
        let below_end = if self.exclusive_end {
            observed < &self.hi
        } else {
            observed <= &self.hi
        };
        match self.strategy {
            RangeStrategy::Linear => observed >= &self.lo && below_end,
            RangeStrategy::Cyclic => observed >= &self.lo || below_end,
        }
    }
}

/// A single value constraint
#[derive(Clone)]
pub enum Matcher {
    /// Matches anything
    Any,
    /// Matches exactly one value
    Exact(Value),
    /// Matches values inside a range
    Range(RangeMatcher),
    /// Matches whatever the predicate accepts
    Predicate(PredicateFn),
}

impl Matcher {
    /// Classify a configuration spec into a matcher
    ///
    /// Absent constraint is `Any`; a range spec compiles to `Range`;
    /// any other value is `Exact`. Predicates are attached through
    /// [`Matcher::predicate`] by code-level rule registration.
    pub fn from_spec(spec: Option<&ValueSpec>) -> Self {
        match spec {
            None => Matcher::Any,
            Some(ValueSpec::Range(r)) => {
                Matcher::Range(RangeMatcher::new(r.lo.clone(), r.hi.clone(), r.exclusive_end))
            }
            Some(ValueSpec::Single(v)) => Matcher::Exact(v.clone()),
        }
    }

    /// An exact-value matcher
    pub fn exact(value: impl Into<Value>) -> Self {
        Matcher::Exact(value.into())
    }

    /// An inclusive range matcher
    pub fn range(lo: impl Into<Value>, hi: impl Into<Value>) -> Self {
        Matcher::Range(RangeMatcher::new(lo.into(), hi.into(), false))
    }

    /// A half-open range matcher (`[lo, hi)`)
    pub fn range_exclusive(lo: impl Into<Value>, hi: impl Into<Value>) -> Self {
        Matcher::Range(RangeMatcher::new(lo.into(), hi.into(), true))
    }

    /// A predicate matcher
    pub fn predicate(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Matcher::Predicate(Arc::new(f))
    }

    /// Whether `observed` satisfies the constraint
    pub fn matches(&self, observed: &Value) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Exact(v) => observed == v,
            Matcher::Range(r) => r.matches(observed),
            Matcher::Predicate(f) => f(observed),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Any => write!(f, "Any"),
            Matcher::Exact(v) => f.debug_tuple("Exact").field(v).finish(),
            Matcher::Range(r) => f.debug_tuple("Range").field(r).finish(),
            Matcher::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_matches_everything() {
        let m = Matcher::Any;
        assert!(m.matches(&Value::from("ON")));
        assert!(m.matches(&Value::Number(42.0)));
        assert!(m.matches(&Value::None));
    }

    #[test]
    fn test_exact_match() {
        let m = Matcher::exact("ON");
        assert!(m.matches(&Value::from("ON")));
        assert!(!m.matches(&Value::from("OFF")));
        // Cross-variant never matches
        assert!(!m.matches(&Value::Number(1.0)));
    }

    #[test]
    fn test_linear_range_inclusive() {
        let m = Matcher::range(10.0, 20.0);
        assert!(m.matches(&Value::Number(10.0)));
        assert!(m.matches(&Value::Number(15.0)));
        assert!(m.matches(&Value::Number(20.0)));
        assert!(!m.matches(&Value::Number(9.9)));
        assert!(!m.matches(&Value::Number(20.1)));
    }

    #[test]
    fn test_linear_range_exclusive_end() {
        let m = Matcher::range_exclusive(10.0, 20.0);
        assert!(m.matches(&Value::Number(10.0)));
        assert!(!m.matches(&Value::Number(20.0)));
    }

    #[test]
    fn test_cyclic_time_range_spans_midnight() {
        // 22:00 .. 06:00 wraps through midnight
        let m = Matcher::range(
            Value::time(22, 0, 0).unwrap(),
            Value::time(6, 0, 0).unwrap(),
        );
        assert!(m.matches(&Value::time(23, 30, 0).unwrap()));
        assert!(m.matches(&Value::time(2, 0, 0).unwrap()));
        assert!(m.matches(&Value::time(22, 0, 0).unwrap()));
        assert!(m.matches(&Value::time(6, 0, 0).unwrap()));
        assert!(!m.matches(&Value::time(12, 0, 0).unwrap()));
    }

    #[test]
    fn test_cyclic_range_exclusive_end() {
        let m = Matcher::range_exclusive(
            Value::time(22, 0, 0).unwrap(),
            Value::time(6, 0, 0).unwrap(),
        );
        assert!(m.matches(&Value::time(5, 59, 59).unwrap()));
        assert!(!m.matches(&Value::time(6, 0, 0).unwrap()));
    }

    #[test]
    fn test_descending_number_range_is_not_cyclic() {
        // Numbers don't wrap; lo > hi is simply an empty range
        let m = Matcher::range(20.0, 10.0);
        assert!(!m.matches(&Value::Number(15.0)));
        assert!(!m.matches(&Value::Number(25.0)));
        assert!(!m.matches(&Value::Number(5.0)));
    }

    #[test]
    fn test_range_rejects_unordered_values() {
        let m = Matcher::range(10.0, 20.0);
        assert!(!m.matches(&Value::from("15")));
        assert!(!m.matches(&Value::None));
    }

    #[test]
    fn test_predicate() {
        let m = Matcher::predicate(|v| matches!(v, Value::Number(n) if *n % 2.0 == 0.0));
        assert!(m.matches(&Value::Number(4.0)));
        assert!(!m.matches(&Value::Number(3.0)));
        assert!(!m.matches(&Value::from("4")));
    }

    #[test]
    fn test_spec_classification() {
        assert!(matches!(Matcher::from_spec(None), Matcher::Any));

        let single: ValueSpec = serde_json::from_str("\"ON\"").unwrap();
        assert!(matches!(
            Matcher::from_spec(Some(&single)),
            Matcher::Exact(_)
        ));

        let range: ValueSpec = serde_json::from_str(r#"{"lo": 10, "hi": 20}"#).unwrap();
        let m = Matcher::from_spec(Some(&range));
        assert!(m.matches(&Value::Number(15.0)));
        assert!(!m.matches(&Value::Number(25.0)));
    }
}
