//! Rule registration and event dispatch
//!
//! The RuleEngine compiles declarative trigger configs into guards,
//! delay controllers, and periodic-schedule registrations, routes bus
//! events to them, and invokes rule actions on positive decisions.

use dashmap::DashMap;
use hearth_core::{Event, ThingStatus, Value};
use hearth_event_bus::EventBus;
use hearth_core::events::{ITEM_COMMAND, ITEM_STATE_CHANGED, ITEM_STATE_UPDATED, THING_STATUS_CHANGED};
use hearth_timers::Timers;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::delay::{DelayController, DelaySpec};
use crate::guard::{normalize, EventSource, Guard};
use crate::matcher::{Matcher, ValueSpec};
use crate::schedule::ScheduleSpec;
use crate::trigger::{
    ActionFn, PeriodSpec, PeriodicTrigger, Trigger, TriggerData, TriggerError,
};

/// Rule errors
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule not found: {0}")]
    NotFound(String),

    #[error("invalid rule configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Trigger(#[from] TriggerError),
}

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;

/// Host boundary for native periodic triggers
///
/// The engine hands over a six-field schedule expression; the host fires
/// the callback each time the expression matches wall-clock time.
pub trait PeriodicHost: Send + Sync {
    /// Register a periodic callback for a rule
    fn add_periodic(&self, rule_id: &str, expression: &str, action: ActionFn);

    /// Drop every periodic registration owned by a rule
    fn remove_rule(&self, rule_id: &str);
}

/// Rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Unique ID (auto-generated when not provided)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Triggers that run the rule's action
    #[serde(default, alias = "trigger")]
    pub triggers: Vec<Trigger>,

    /// Whether the rule starts enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// How a compiled trigger reacts to events
enum CompiledTrigger {
    /// Guard evaluated inline; action invoked synchronously on a match
    Immediate {
        trigger_id: Option<String>,
        kind: &'static str,
        source: EventSource,
        guard: Guard,
    },

    /// Guard must hold for a duration before the action runs
    Held {
        source: EventSource,
        controller: Arc<DelayController>,
    },

    /// Handed to the host's native periodic mechanism at registration
    Periodic,
}

struct RegisteredRule {
    label: Option<String>,
    enabled: bool,
    compiled: Vec<CompiledTrigger>,
    action: ActionFn,
}

impl RegisteredRule {
    fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.label.as_deref().unwrap_or(id)
    }
}

/// Compiles, stores, and dispatches rules
pub struct RuleEngine {
    bus: Arc<EventBus>,
    timers: Arc<Timers>,
    periodic_host: Option<Arc<dyn PeriodicHost>>,
    rules: DashMap<String, RegisteredRule>,
}

impl RuleEngine {
    /// Create an engine over the given bus and timer context
    pub fn new(bus: Arc<EventBus>, timers: Arc<Timers>) -> Self {
        Self {
            bus,
            timers,
            periodic_host: None,
            rules: DashMap::new(),
        }
    }

    /// Attach the host's periodic-trigger mechanism
    pub fn with_periodic_host(mut self, host: Arc<dyn PeriodicHost>) -> Self {
        self.periodic_host = Some(host);
        self
    }

    /// The engine's timer context
    pub fn timers(&self) -> &Arc<Timers> {
        &self.timers
    }

    /// Register a rule, compiling and validating all of its triggers
    ///
    /// Fails fast: any invalid trigger aborts the whole registration and
    /// leaves nothing behind.
    pub fn register(
        &self,
        config: RuleConfig,
        action: impl Fn(TriggerData) + Send + Sync + 'static,
    ) -> RuleResult<String> {
        let id = config
            .id
            .unwrap_or_else(|| ulid::Ulid::new().to_string());

        if self.rules.contains_key(&id) {
            return Err(RuleError::InvalidConfig(format!(
                "rule with ID {} already exists",
                id
            )));
        }

        let action: ActionFn = Arc::new(action);
        let mut compiled = Vec::with_capacity(config.triggers.len());
        for (index, trigger) in config.triggers.iter().enumerate() {
            match self.compile(&id, index, trigger, &action) {
                Ok(c) => compiled.push(c),
                Err(err) => {
                    // Undo periodic registrations made by earlier triggers
                    if let Some(host) = &self.periodic_host {
                        host.remove_rule(&id);
                    }
                    return Err(err.into());
                }
            }
        }

        let rule = RegisteredRule {
            label: config.label,
            enabled: config.enabled,
            compiled,
            action,
        };
        info!(rule_id = %id, name = rule.display_name(&id), "Registered rule");
        self.rules.insert(id.clone(), rule);
        Ok(id)
    }

    fn compile(
        &self,
        rule_id: &str,
        index: usize,
        trigger: &Trigger,
        action: &ActionFn,
    ) -> Result<CompiledTrigger, TriggerError> {
        match trigger {
            Trigger::ItemChange(t) => self.compile_transition(
                rule_id,
                index,
                trigger.kind(),
                EventSource::Item(t.item.clone()),
                &t.from,
                &t.to,
                t.r#for,
                t.id.clone(),
                action,
            ),
            Trigger::ThingStatus(t) => self.compile_transition(
                rule_id,
                index,
                trigger.kind(),
                EventSource::Thing(t.thing.clone()),
                &coerce_status_spec(&t.from),
                &coerce_status_spec(&t.to),
                t.r#for,
                t.id.clone(),
                action,
            ),
            Trigger::ItemCommand(t) => Ok(CompiledTrigger::Immediate {
                trigger_id: t.id.clone(),
                kind: trigger.kind(),
                source: EventSource::Item(t.item.clone()),
                guard: Guard::command(Matcher::from_spec(t.command.as_ref())),
            }),
            Trigger::Periodic(t) => self.compile_periodic(rule_id, t, action),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_transition(
        &self,
        rule_id: &str,
        index: usize,
        kind: &'static str,
        source: EventSource,
        from: &Option<ValueSpec>,
        to: &Option<ValueSpec>,
        hold: Option<Duration>,
        trigger_id: Option<String>,
        action: &ActionFn,
    ) -> Result<CompiledTrigger, TriggerError> {
        let guard = Guard::transition(
            Matcher::from_spec(from.as_ref()),
            Matcher::from_spec(to.as_ref()),
        );

        match hold {
            None => Ok(CompiledTrigger::Immediate {
                trigger_id,
                kind,
                source,
                guard,
            }),
            Some(duration) => {
                let source_name = source_label(&source);
                let controller = DelayController::new(
                    DelaySpec {
                        rule_id: rule_id.to_string(),
                        tag: format!("held_for[{}]", index),
                        trigger_id,
                        kind,
                        source: source_name,
                        guard,
                        duration,
                    },
                    self.timers.clone(),
                    action.clone(),
                )?;
                Ok(CompiledTrigger::Held { source, controller })
            }
        }
    }

    fn compile_periodic(
        &self,
        rule_id: &str,
        trigger: &PeriodicTrigger,
        action: &ActionFn,
    ) -> Result<CompiledTrigger, TriggerError> {
        let host = self.periodic_host.as_ref().ok_or_else(|| {
            TriggerError::InvalidConfig("no periodic host configured".to_string())
        })?;

        let spec = match &trigger.every {
            PeriodSpec::Symbol(period) => ScheduleSpec::from_period(*period, trigger.at)?,
            PeriodSpec::Interval(duration) => {
                // A repeat interval and an absolute time of day are
                // mutually exclusive specifications.
                if trigger.at.is_some() {
                    return Err(TriggerError::InvalidConfig(
                        "a repeat interval cannot be combined with a time of day".to_string(),
                    ));
                }
                ScheduleSpec::from_duration(*duration)?
            }
        };

        let expression = spec.to_string();
        let trigger_id = trigger.id.clone();
        let action = action.clone();
        let wrapped: ActionFn = Arc::new(move |mut data: TriggerData| {
            if let Some(id) = &trigger_id {
                data = data.with_id(id);
            }
            action(data);
        });

        debug!(rule_id, %expression, "Registering periodic trigger with host scheduler");
        host.add_periodic(rule_id, &expression, wrapped);
        Ok(CompiledTrigger::Periodic)
    }

    /// Route one event to every interested trigger
    pub fn dispatch(&self, event: &Event<serde_json::Value>) {
        let Some((source, input)) = normalize(event) else {
            trace!(event_type = %event.event_type, "Event not relevant to rule dispatch");
            return;
        };

        // Collect matches first so no shard lock is held while actions run
        let mut immediate: Vec<(ActionFn, TriggerData)> = Vec::new();
        let mut held: Vec<Arc<DelayController>> = Vec::new();

        for rule in self.rules.iter() {
            if !rule.enabled {
                continue;
            }
            for compiled in &rule.compiled {
                match compiled {
                    CompiledTrigger::Immediate {
                        trigger_id,
                        kind,
                        source: watched,
                        guard,
                    } if trigger_accepts(kind, false, event, watched, &source) => {
                        if guard.evaluate(&input) {
                            let mut data = TriggerData::new(*kind)
                                .with_var("source", json!(source_label(&source)))
                                .with_var("old_value", json!(input.old_value))
                                .with_var("new_value", json!(input.new_value))
                                .with_var("command", json!(input.aux_value));
                            if let Some(id) = trigger_id {
                                data = data.with_id(id);
                            }
                            debug!(rule_id = %rule.key(), kind, "Trigger matched");
                            immediate.push((rule.action.clone(), data));
                        }
                    }
                    CompiledTrigger::Held {
                        source: watched,
                        controller,
                    } if trigger_accepts(controller.kind(), true, event, watched, &source) => {
                        held.push(controller.clone());
                    }
                    _ => {}
                }
            }
        }

        for (action, data) in immediate {
            action(data);
        }
        for controller in held {
            if let Err(err) = controller.handle_event(&input) {
                warn!(error = %err, "Delay controller transition failed");
            }
        }
    }

    /// Spawn the bus-consumption loop
    pub fn run(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = self;
        let mut rx = engine.bus.subscribe_all();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => engine.dispatch(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Rule engine lagged behind the event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Enable a rule
    pub fn enable(&self, id: &str) -> RuleResult<()> {
        let mut rule = self
            .rules
            .get_mut(id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
        rule.enabled = true;
        info!(rule_id = %id, "Enabled rule");
        Ok(())
    }

    /// Disable a rule, tearing down any pending holds
    pub fn disable(&self, id: &str) -> RuleResult<()> {
        let mut rule = self
            .rules
            .get_mut(id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
        rule.enabled = false;
        for compiled in &rule.compiled {
            if let CompiledTrigger::Held { controller, .. } = compiled {
                controller.cancel();
            }
        }
        info!(rule_id = %id, "Disabled rule");
        Ok(())
    }

    /// Remove a rule, cancelling its delay timers and periodic
    /// registrations
    pub fn remove(&self, id: &str) -> RuleResult<()> {
        let (id, rule) = self
            .rules
            .remove(id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;

        for compiled in &rule.compiled {
            if let CompiledTrigger::Held { controller, .. } = compiled {
                controller.cancel();
            }
        }
        if let Some(host) = &self.periodic_host {
            host.remove_rule(&id);
        }

        info!(rule_id = %id, name = rule.display_name(&id), "Removed rule");
        Ok(())
    }

    /// Whether a rule exists
    pub fn contains(&self, id: &str) -> bool {
        self.rules.contains_key(id)
    }

    /// Number of registered rules
    pub fn count(&self) -> usize {
        self.rules.len()
    }

    /// Shut down: stop accepting timers, cancel everything, drop rules
    pub fn shutdown(&self) {
        let cancelled = self.timers.shutdown();
        for entry in self.rules.iter() {
            if let Some(host) = &self.periodic_host {
                host.remove_rule(entry.key());
            }
        }
        self.rules.clear();
        info!(cancelled, "Rule engine shut down");
    }
}

/// Which bus events a trigger kind consumes
///
/// Held item triggers also consume re-reported updates so an unchanged
/// value keeps refreshing the hold; immediate change triggers react to
/// actual changes only.
fn trigger_accepts(
    kind: &str,
    held: bool,
    event: &Event<serde_json::Value>,
    watched: &EventSource,
    source: &EventSource,
) -> bool {
    if watched != source {
        return false;
    }
    let event_type = event.event_type.as_str();
    match kind {
        "item_change" => {
            event_type == ITEM_STATE_CHANGED || (held && event_type == ITEM_STATE_UPDATED)
        }
        "item_command" => event_type == ITEM_COMMAND,
        "thing_status" => event_type == THING_STATUS_CHANGED,
        _ => false,
    }
}

fn source_label(source: &EventSource) -> String {
    match source {
        EventSource::Item(item) => item.to_string(),
        EventSource::Thing(thing) => thing.to_string(),
    }
}

/// Map textual status specs into the status domain so guards compare
/// statuses against statuses
fn coerce_status_spec(spec: &Option<ValueSpec>) -> Option<ValueSpec> {
    spec.as_ref().map(|spec| match spec {
        ValueSpec::Single(Value::Text(s)) => match s.parse::<ThingStatus>() {
            Ok(status) => ValueSpec::Single(Value::Status(status)),
            Err(_) => ValueSpec::Single(Value::Text(s.clone())),
        },
        other => other.clone(),
    })
}
