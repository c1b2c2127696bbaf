//! Item and thing identifier types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid item names
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItemNameError {
    #[error("item name cannot be empty")]
    Empty,

    #[error("item name must start with a letter")]
    InvalidStart,

    #[error("item name contains invalid characters (must be alphanumeric with underscores)")]
    InvalidChars,
}

/// The name of an item (e.g., "Livingroom_Lamp")
///
/// Item names are alphanumeric with underscores and must start with a letter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemName(String);

impl ItemName {
    /// Create a new ItemName, validating the format
    pub fn new(name: impl Into<String>) -> Result<Self, ItemNameError> {
        let name = name.into();

        let mut chars = name.chars();
        match chars.next() {
            None => return Err(ItemNameError::Empty),
            Some(c) if !c.is_ascii_alphabetic() => return Err(ItemNameError::InvalidStart),
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ItemNameError::InvalidChars);
        }

        Ok(Self(name))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ItemName {
    type Err = ItemNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ItemName {
    type Error = ItemNameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ItemName> for String {
    fn from(name: ItemName) -> Self {
        name.0
    }
}

impl fmt::Display for ItemName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for invalid thing UIDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThingUidError {
    #[error("thing UID must contain at least two ':'-separated segments")]
    TooFewSegments,

    #[error("thing UID segment cannot be empty")]
    EmptySegment,

    #[error("thing UID segment contains invalid characters")]
    InvalidChars,
}

/// The UID of a thing (e.g., "zwave:device:dimmer_1")
///
/// Thing UIDs are colon-separated segments identifying a binding, a type,
/// and the concrete device instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThingUid(String);

impl ThingUid {
    /// Create a new ThingUid, validating the format
    pub fn new(uid: impl Into<String>) -> Result<Self, ThingUidError> {
        let uid = uid.into();

        let segments: Vec<&str> = uid.split(':').collect();
        if segments.len() < 2 {
            return Err(ThingUidError::TooFewSegments);
        }
        for segment in &segments {
            if segment.is_empty() {
                return Err(ThingUidError::EmptySegment);
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(ThingUidError::InvalidChars);
            }
        }

        Ok(Self(uid))
    }

    /// Get the UID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the binding segment (the first segment of the UID)
    pub fn binding(&self) -> &str {
        self.0.split(':').next().unwrap_or(&self.0)
    }
}

impl FromStr for ThingUid {
    type Err = ThingUidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ThingUid {
    type Error = ThingUidError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ThingUid> for String {
    fn from(uid: ThingUid) -> Self {
        uid.0
    }
}

impl fmt::Display for ThingUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
