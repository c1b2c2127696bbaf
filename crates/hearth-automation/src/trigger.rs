//! Trigger configuration types
//!
//! Triggers declare which events a rule is interested in and under what
//! guard the rule's action runs. When a trigger matches, it produces
//! TriggerData carrying context variables for the action.

use chrono::{DateTime, NaiveTime, Utc};
use hearth_core::{ItemName, ThingUid};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::matcher::ValueSpec;
use crate::schedule::{Period, ScheduleError};

/// Trigger errors
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("invalid trigger configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Timer(#[from] hearth_timers::TimerError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Result type for trigger operations
pub type TriggerResult<T> = Result<T, TriggerError>;

/// Action callback invoked when a trigger decision is positive
pub type ActionFn = Arc<dyn Fn(TriggerData) + Send + Sync>;

/// Data provided when a trigger fires
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerData {
    /// Optional trigger ID for telling triggers apart in the action
    pub id: Option<String>,

    /// Trigger kind (e.g. "item_change", "periodic")
    pub kind: String,

    /// Context variables describing the matched event
    #[serde(flatten)]
    pub variables: HashMap<String, serde_json::Value>,

    /// When the trigger decision was made
    pub triggered_at: DateTime<Utc>,
}

impl TriggerData {
    /// Create new trigger data
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            variables: HashMap::new(),
            triggered_at: Utc::now(),
        }
    }

    /// Set trigger ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a context variable
    pub fn with_var(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }
}

/// Trigger definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum Trigger {
    /// Fires when an item's value changes
    ItemChange(ItemChangeTrigger),

    /// Fires when a command is sent to an item
    ItemCommand(ItemCommandTrigger),

    /// Fires when a thing's status transitions
    ThingStatus(ThingStatusTrigger),

    /// Fires on a synthesized periodic schedule
    Periodic(PeriodicTrigger),
}

impl Trigger {
    /// Get the trigger's ID if set
    pub fn id(&self) -> Option<&str> {
        match self {
            Trigger::ItemChange(t) => t.id.as_deref(),
            Trigger::ItemCommand(t) => t.id.as_deref(),
            Trigger::ThingStatus(t) => t.id.as_deref(),
            Trigger::Periodic(t) => t.id.as_deref(),
        }
    }

    /// Get the trigger kind name
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::ItemChange(_) => "item_change",
            Trigger::ItemCommand(_) => "item_command",
            Trigger::ThingStatus(_) => "thing_status",
            Trigger::Periodic(_) => "periodic",
        }
    }
}

/// Item value change trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemChangeTrigger {
    /// Optional trigger ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Item to watch
    pub item: ItemName,

    /// Previous value to match (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ValueSpec>,

    /// New value to match (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<ValueSpec>,

    /// Duration the new value must hold before the action runs
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "option_duration_serde"
    )]
    pub r#for: Option<Duration>,
}

/// Item command trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemCommandTrigger {
    /// Optional trigger ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Item receiving the command
    pub item: ItemName,

    /// Command payload to match (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<ValueSpec>,
}

/// Thing status transition trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThingStatusTrigger {
    /// Optional trigger ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Thing to watch
    pub thing: ThingUid,

    /// Previous status to match (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ValueSpec>,

    /// New status to match (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<ValueSpec>,

    /// Duration the new status must hold before the action runs
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "option_duration_serde"
    )]
    pub r#for: Option<Duration>,
}

/// Periodic trigger over a synthesized schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodicTrigger {
    /// Optional trigger ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Symbolic period or fixed repeat interval
    pub every: PeriodSpec,

    /// Absolute time of day; only valid with day-or-coarser symbolic
    /// periods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<NaiveTime>,
}

/// Symbolic period or a fixed `HH:MM:SS` repeat interval
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PeriodSpec {
    Symbol(Period),
    Interval(#[serde(with = "duration_serde")] Duration),
}

// --- Duration serde helpers ---

pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let secs = value.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;
        serializer.serialize_str(&format!("{:02}:{:02}:{:02}", hours, mins, secs))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Parse HH:MM:SS, MM:SS, or SS
    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.len() {
            1 => {
                let secs: u64 = parts[0].parse().map_err(|_| "invalid seconds")?;
                Ok(Duration::from_secs(secs))
            }
            2 => {
                let mins: u64 = parts[0].parse().map_err(|_| "invalid minutes")?;
                let secs: u64 = parts[1].parse().map_err(|_| "invalid seconds")?;
                Ok(Duration::from_secs(mins * 60 + secs))
            }
            3 => {
                let hours: u64 = parts[0].parse().map_err(|_| "invalid hours")?;
                let mins: u64 = parts[1].parse().map_err(|_| "invalid minutes")?;
                let secs: u64 = parts[2].parse().map_err(|_| "invalid seconds")?;
                Ok(Duration::from_secs(hours * 3600 + mins * 60 + secs))
            }
            _ => Err("invalid duration format".to_string()),
        }
    }
}

pub(crate) mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => super::duration_serde::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            None => Ok(None),
            Some(s) => super::duration_serde::parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
