//! Core types for the hearth rule engine
//!
//! This crate provides the fundamental vocabulary used throughout hearth:
//! ItemName, ThingUid, ThingStatus, Value, Event, and Context.

mod context;
mod event;
mod item;
mod status;
mod value;

pub use context::Context;
pub use event::{Event, EventData, EventType};
pub use item::{ItemName, ItemNameError, ThingUid, ThingUidError};
pub use status::ThingStatus;
pub use value::Value;

/// Standard event types emitted by the host platform
pub mod events {
    use super::*;
    use serde::{Deserialize, Serialize};

    /// Event type for item state changes (old and new value differ)
    pub const ITEM_STATE_CHANGED: &str = "item_state_changed";

    /// Event type for item state updates (value re-reported, possibly unchanged)
    pub const ITEM_STATE_UPDATED: &str = "item_state_updated";

    /// Event type for commands sent to an item
    pub const ITEM_COMMAND: &str = "item_command";

    /// Event type for thing status transitions
    pub const THING_STATUS_CHANGED: &str = "thing_status_changed";

    /// Event type fired when the rule engine starts
    pub const ENGINE_START: &str = "engine_start";

    /// Event type fired when the rule engine shuts down
    pub const ENGINE_SHUTDOWN: &str = "engine_shutdown";

    /// Data for ITEM_STATE_CHANGED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ItemStateChangedData {
        pub item: ItemName,
        pub old_value: Value,
        pub new_value: Value,
    }

    impl EventData for ItemStateChangedData {
        fn event_type() -> &'static str {
            ITEM_STATE_CHANGED
        }
    }

    /// Data for ITEM_STATE_UPDATED events
    ///
    /// Updates carry only the reported value; the platform fires them even
    /// when the value is identical to the previous one.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ItemStateUpdatedData {
        pub item: ItemName,
        pub value: Value,
    }

    impl EventData for ItemStateUpdatedData {
        fn event_type() -> &'static str {
            ITEM_STATE_UPDATED
        }
    }

    /// Data for ITEM_COMMAND events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ItemCommandData {
        pub item: ItemName,
        pub command: Value,
    }

    impl EventData for ItemCommandData {
        fn event_type() -> &'static str {
            ITEM_COMMAND
        }
    }

    /// Data for THING_STATUS_CHANGED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ThingStatusChangedData {
        pub thing: ThingUid,
        pub old_status: ThingStatus,
        pub new_status: ThingStatus,
    }

    impl EventData for ThingStatusChangedData {
        fn event_type() -> &'static str {
            THING_STATUS_CHANGED
        }
    }
}
