//! Guard-driven delay state machine
//!
//! A DelayController fires a rule action only when its guard has held
//! continuously for a configured duration. Each inbound event either
//! starts the hold, refreshes it, or tears it down and immediately
//! re-evaluates; the countdown itself is a single reschedulable timer.

use hearth_core::Value;
use hearth_timers::{TimerError, TimerHandle, Timers};
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::guard::{Guard, GuardInput};
use crate::trigger::{ActionFn, TriggerData, TriggerError, TriggerResult};

/// Static description of a guarded-with-duration trigger
pub struct DelaySpec {
    /// Rule owning the trigger; identity under which timers register
    pub rule_id: String,
    /// Stable call-site tag for the reentrant timer key
    pub tag: String,
    /// Optional trigger ID surfaced in TriggerData
    pub trigger_id: Option<String>,
    /// Trigger kind surfaced in TriggerData
    pub kind: &'static str,
    /// Item or thing the trigger watches, surfaced in TriggerData
    pub source: String,
    /// The guard that must hold
    pub guard: Guard,
    /// How long it must hold
    pub duration: Duration,
}

enum Phase {
    Idle,
    Pending {
        tracking_value: Value,
        timer: TimerHandle,
        data: TriggerData,
    },
}

struct DelayInner {
    phase: Phase,
    /// Bumped on every cancel/replace; a timer callback carrying an
    /// older generation is stale and discards itself.
    generation: u64,
}

/// The per-trigger "hold for duration" state machine
///
/// All transitions run under the instance lock, so the event-delivery
/// path and the timer-fired path observe each step atomically.
pub struct DelayController {
    spec: DelaySpec,
    timers: Arc<Timers>,
    action: ActionFn,
    /// Self-reference handed to timer callbacks; a fired timer whose
    /// controller is gone simply does nothing.
    weak: Weak<DelayController>,
    inner: Mutex<DelayInner>,
}

impl std::fmt::Debug for DelayController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayController")
            .field("kind", &self.spec.kind)
            .field("source", &self.spec.source)
            .finish_non_exhaustive()
    }
}

impl DelayController {
    /// Validate the spec and build the controller
    ///
    /// A zero hold duration is a configuration error, rejected here
    /// rather than at the first event.
    pub fn new(
        spec: DelaySpec,
        timers: Arc<Timers>,
        action: ActionFn,
    ) -> TriggerResult<Arc<Self>> {
        if spec.duration.is_zero() {
            return Err(TriggerError::InvalidConfig(format!(
                "hold duration for trigger on {} must be positive",
                spec.source
            )));
        }

        Ok(Arc::new_cyclic(|weak| Self {
            spec,
            timers,
            action,
            weak: weak.clone(),
            inner: Mutex::new(DelayInner {
                phase: Phase::Idle,
                generation: 0,
            }),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, DelayInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a hold is currently counting down
    pub fn is_pending(&self) -> bool {
        matches!(self.lock().phase, Phase::Pending { .. })
    }

    /// The trigger kind this controller was compiled from
    pub fn kind(&self) -> &'static str {
        self.spec.kind
    }

    /// Run one transition step for an inbound event
    pub fn handle_event(&self, input: &GuardInput) -> TriggerResult<()> {
        let mut inner = self.lock();

        match std::mem::replace(&mut inner.phase, Phase::Idle) {
            Phase::Idle => self.start_hold(&mut inner, input),
            Phase::Pending {
                tracking_value,
                timer,
                data,
            } => {
                if input.new_value == tracking_value {
                    match self.timers.service().reschedule(&timer, self.spec.duration) {
                        Ok(()) => {
                            trace!(
                                rule_id = %self.spec.rule_id,
                                value = %tracking_value,
                                "Refreshed hold timer"
                            );
                            inner.phase = Phase::Pending {
                                tracking_value,
                                timer,
                                data,
                            };
                            Ok(())
                        }
                        Err(TimerError::AlreadyTerminated) => {
                            // The timer expired while this event was in
                            // flight; the fire won the race. Its callback
                            // still carries the current generation and
                            // will invoke the action.
                            debug!(
                                rule_id = %self.spec.rule_id,
                                "Hold timer fired before reschedule; letting the firing stand"
                            );
                            inner.phase = Phase::Pending {
                                tracking_value,
                                timer,
                                data,
                            };
                            Ok(())
                        }
                        Err(err) => {
                            inner.generation += 1;
                            Err(err.into())
                        }
                    }
                } else {
                    self.timers.service().cancel(&timer);
                    self.timers.registry().unregister(&timer);
                    inner.generation += 1;
                    trace!(
                        rule_id = %self.spec.rule_id,
                        tracked = %tracking_value,
                        new_value = %input.new_value,
                        "Value moved away from tracked value; re-evaluating"
                    );
                    // The event's own old_value is authoritative for the
                    // from-check here, not the value just untracked.
                    self.start_hold(&mut inner, input)
                }
            }
        }
    }

    /// The IDLE transition: evaluate the guard and, on a match, begin a
    /// hold. `inner.phase` must be Idle on entry.
    fn start_hold(&self, inner: &mut DelayInner, input: &GuardInput) -> TriggerResult<()> {
        if !self.spec.guard.evaluate(input) {
            trace!(rule_id = %self.spec.rule_id, "Guard did not match; staying idle");
            return Ok(());
        }

        inner.generation += 1;
        let generation = inner.generation;
        let controller = self.weak.clone();

        let timer = self.timers.schedule(
            self.spec.duration,
            Some(&self.spec.rule_id),
            Some(&self.spec.tag),
            move || {
                if let Some(controller) = controller.upgrade() {
                    controller.on_timer_fired(generation);
                }
            },
        )?;

        let mut data = TriggerData::new(self.spec.kind)
            .with_var("source", json!(self.spec.source))
            .with_var("old_value", json!(input.old_value))
            .with_var("new_value", json!(input.new_value));
        if let Some(id) = &self.spec.trigger_id {
            data = data.with_id(id);
        }

        debug!(
            rule_id = %self.spec.rule_id,
            value = %input.new_value,
            duration_secs = self.spec.duration.as_secs(),
            "Holding value; action fires if it survives the duration"
        );
        inner.phase = Phase::Pending {
            tracking_value: input.new_value.clone(),
            timer,
            data,
        };
        Ok(())
    }

    /// Timer-fired path; invoked from the timer task
    fn on_timer_fired(&self, generation: u64) {
        let data = {
            let mut inner = self.lock();
            if inner.generation != generation {
                trace!(rule_id = %self.spec.rule_id, "Stale hold timer callback discarded");
                return;
            }
            match std::mem::replace(&mut inner.phase, Phase::Idle) {
                Phase::Pending { data, .. } => Some(data),
                Phase::Idle => {
                    warn!(
                        rule_id = %self.spec.rule_id,
                        "Hold timer fired with no pending hold; recovering to idle"
                    );
                    None
                }
            }
        };

        // The action runs outside the instance lock and outside this
        // subsystem's control.
        if let Some(data) = data {
            (self.action)(data);
        }
    }

    /// Tear down any pending hold; used at rule removal
    pub fn cancel(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        if let Phase::Pending { timer, .. } = std::mem::replace(&mut inner.phase, Phase::Idle) {
            self.timers.service().cancel(&timer);
            self.timers.registry().unregister(&timer);
            debug!(rule_id = %self.spec.rule_id, "Cancelled pending hold");
        }
    }
}
