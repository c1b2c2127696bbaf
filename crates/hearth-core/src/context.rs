//! Context type for tracking event origin and causality

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Context tracking the origin and causality of events and actions
///
/// Every event carries a Context identifying which rule (if any) produced
/// it, so that chains of rule-triggered events can be traced back to their
/// origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// Rule that produced this event (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,

    /// Parent context ID for tracking causality chains
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// Create a new context with a fresh ULID
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            rule_id: None,
            parent_id: None,
        }
    }

    /// Create a new context attributed to a rule
    pub fn for_rule(rule_id: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            rule_id: Some(rule_id.into()),
            parent_id: None,
        }
    }

    /// Create a child context with this context as parent
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            rule_id: self.rule_id.clone(),
            parent_id: Some(self.id.clone()),
        }
    }

    /// Create a child context attributed to a different rule
    pub fn child_for_rule(&self, rule_id: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            rule_id: Some(rule_id.into()),
            parent_id: Some(self.id.clone()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
