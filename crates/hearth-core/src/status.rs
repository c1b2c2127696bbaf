//! Thing status enumeration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Connectivity/lifecycle status of a thing
///
/// Statuses are opaque comparable symbols as far as guard evaluation is
/// concerned; no ordering between them is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThingStatus {
    Uninitialized,
    Initializing,
    Unknown,
    Online,
    Offline,
    Removing,
    Removed,
}

impl ThingStatus {
    /// All known statuses, in lifecycle order
    pub const ALL: [ThingStatus; 7] = [
        ThingStatus::Uninitialized,
        ThingStatus::Initializing,
        ThingStatus::Unknown,
        ThingStatus::Online,
        ThingStatus::Offline,
        ThingStatus::Removing,
        ThingStatus::Removed,
    ];

    /// The canonical upper-case name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            ThingStatus::Uninitialized => "UNINITIALIZED",
            ThingStatus::Initializing => "INITIALIZING",
            ThingStatus::Unknown => "UNKNOWN",
            ThingStatus::Online => "ONLINE",
            ThingStatus::Offline => "OFFLINE",
            ThingStatus::Removing => "REMOVING",
            ThingStatus::Removed => "REMOVED",
        }
    }
}

impl fmt::Display for ThingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ThingStatus {
    type Err = String;

    /// Parse a status name, case-insensitively
    ///
    /// Unrecognized enumerants are an error; callers treat them as
    /// non-matching rather than propagating.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == upper)
            .ok_or_else(|| format!("unrecognized thing status: {}", s))
    }
}
