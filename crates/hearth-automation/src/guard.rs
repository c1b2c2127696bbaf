//! Trigger guards and event normalization
//!
//! A Guard composes three matchers against a normalized event record.
//! The normalization adapters here are the only place that knows about
//! the heterogeneous shapes the host platform emits; the Guard itself
//! only ever sees `{old_value, new_value, aux_value}`.

use hearth_core::events::{
    ItemCommandData, ItemStateChangedData, ItemStateUpdatedData, ThingStatusChangedData,
    ITEM_COMMAND, ITEM_STATE_CHANGED, ITEM_STATE_UPDATED, THING_STATUS_CHANGED,
};
use hearth_core::{Event, ItemName, ThingUid, Value};
use tracing::trace;

use crate::matcher::Matcher;

/// A normalized event record, as seen by guard evaluation
///
/// Fields an event shape does not carry are `Value::None`.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardInput {
    pub old_value: Value,
    pub new_value: Value,
    pub aux_value: Value,
}

impl GuardInput {
    /// Record for a state transition
    pub fn change(old_value: impl Into<Value>, new_value: impl Into<Value>) -> Self {
        Self {
            old_value: old_value.into(),
            new_value: new_value.into(),
            aux_value: Value::None,
        }
    }

    /// Record for a re-reported (possibly unchanged) value
    pub fn update(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            old_value: value.clone(),
            new_value: value,
            aux_value: Value::None,
        }
    }

    /// Record for a command payload
    pub fn command(command: impl Into<Value>) -> Self {
        Self {
            old_value: Value::None,
            new_value: Value::None,
            aux_value: command.into(),
        }
    }
}

/// The entity an event is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    Item(ItemName),
    Thing(ThingUid),
}

/// Boolean condition over an event's before/after/command fields
///
/// Short-circuit AND of the three matchers; absence of a constraint is
/// represented by `Matcher::Any`.
#[derive(Debug, Clone)]
pub struct Guard {
    from: Matcher,
    to: Matcher,
    aux: Matcher,
}

impl Guard {
    /// Build a guard from its three matchers
    pub fn new(from: Matcher, to: Matcher, aux: Matcher) -> Self {
        Self { from, to, aux }
    }

    /// Guard over a state transition only
    pub fn transition(from: Matcher, to: Matcher) -> Self {
        Self::new(from, to, Matcher::Any)
    }

    /// Guard over a command payload only
    pub fn command(aux: Matcher) -> Self {
        Self::new(Matcher::Any, Matcher::Any, aux)
    }

    /// Evaluate the guard against a normalized event record
    pub fn evaluate(&self, input: &GuardInput) -> bool {
        if !self.from.matches(&input.old_value) {
            trace!(old_value = %input.old_value, "From constraint did not match");
            return false;
        }
        if !self.to.matches(&input.new_value) {
            trace!(new_value = %input.new_value, "To constraint did not match");
            return false;
        }
        if !self.aux.matches(&input.aux_value) {
            trace!(aux_value = %input.aux_value, "Aux constraint did not match");
            return false;
        }
        true
    }
}

/// Normalize a bus event into the shape guard evaluation understands
///
/// One adapter arm per event kind; unrecognized event types and
/// malformed payloads yield None, so a single bad event can never take
/// the engine down.
pub fn normalize(event: &Event<serde_json::Value>) -> Option<(EventSource, GuardInput)> {
    match event.event_type.as_str() {
        ITEM_STATE_CHANGED => {
            let data: ItemStateChangedData = serde_json::from_value(event.data.clone()).ok()?;
            Some((
                EventSource::Item(data.item),
                GuardInput::change(data.old_value, data.new_value),
            ))
        }
        ITEM_STATE_UPDATED => {
            let data: ItemStateUpdatedData = serde_json::from_value(event.data.clone()).ok()?;
            Some((EventSource::Item(data.item), GuardInput::update(data.value)))
        }
        ITEM_COMMAND => {
            let data: ItemCommandData = serde_json::from_value(event.data.clone()).ok()?;
            Some((
                EventSource::Item(data.item),
                GuardInput::command(data.command),
            ))
        }
        THING_STATUS_CHANGED => {
            let data: ThingStatusChangedData = serde_json::from_value(event.data.clone()).ok()?;
            Some((
                EventSource::Thing(data.thing),
                GuardInput::change(data.old_status, data.new_status),
            ))
        }
        _ => None,
    }
}
