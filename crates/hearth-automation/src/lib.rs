//! Rule Automation Engine
//!
//! This crate provides the rule layer of hearth. Rules are event-driven:
//! a trigger guard decides whether an inbound item/thing/command event is
//! interesting, optionally requires the condition to hold for a duration,
//! and then invokes the rule's action.
//!
//! # Architecture
//!
//! ```text
//! RULE = TRIGGERS (guard [+ hold duration]) → ACTION
//! ```
//!
//! - **Matchers**: Pure value predicates composed into guards
//! - **Guards**: Boolean decisions over normalized event records
//! - **Delay controllers**: "Hold for N" state machines over guards
//! - **Schedule synthesis**: Symbolic/duration intervals → periodic
//!   schedule expressions
//!
//! # Key Types
//!
//! - [`Trigger`] - Declarative trigger configuration
//! - [`Guard`] - Compiled guard over an event's before/after/command fields
//! - [`DelayController`] - Fires an action once a guard holds continuously
//! - [`ScheduleSpec`] - Six-field periodic schedule expression
//! - [`RuleEngine`] - Registers rules and dispatches events

pub mod delay;
pub mod guard;
pub mod matcher;
pub mod rule;
pub mod schedule;
pub mod trigger;

pub use delay::{DelayController, DelaySpec};
pub use guard::{normalize, EventSource, Guard, GuardInput};
pub use matcher::{Matcher, RangeMatcher, RangeSpec, ValueSpec};
pub use rule::{PeriodicHost, RuleConfig, RuleEngine, RuleError, RuleResult};
pub use schedule::{Field, Period, ScheduleError, ScheduleResult, ScheduleSpec};
pub use trigger::{
    ActionFn, ItemChangeTrigger, ItemCommandTrigger, PeriodSpec, PeriodicTrigger,
    ThingStatusTrigger, Trigger, TriggerData, TriggerError, TriggerResult,
};
