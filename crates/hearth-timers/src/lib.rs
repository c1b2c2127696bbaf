//! Timer scheduling for the hearth rule engine
//!
//! Two layers: the `TimerService` wraps the runtime's one-shot delayed
//! callback primitive, and the `TimerRegistry` keys live timers by
//! identity so rapid repeated requests for "a timer doing X" reuse one
//! timer instead of piling up duplicates. The `Timers` facade composes
//! both into the injectable engine-context object the rest of the engine
//! holds.

mod registry;
mod service;

pub use registry::{ReentrantKey, TimerRegistry};
pub use service::{TimerHandle, TimerId, TimerService};

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Timer errors
#[derive(Debug, Error)]
pub enum TimerError {
    /// The host's delayed-execution primitive rejected the request
    #[error("scheduling failed: {0}")]
    SchedulingFailure(String),

    /// The handle already fired or was cancelled
    #[error("timer already fired or was cancelled")]
    AlreadyTerminated,

    /// A live timer already holds the reentrant key
    #[error("a live timer is already registered under {0}")]
    ReentrantKeyOccupied(ReentrantKey),
}

/// Result type for timer operations
pub type TimerResult<T> = Result<T, TimerError>;

/// The engine's timer context: service plus registry
///
/// Constructed once by the rule engine's lifecycle and passed to every
/// component that schedules timers; owning it explicitly (rather than as
/// ambient global state) is what makes teardown and fake-clock testing
/// clean.
pub struct Timers {
    service: TimerService,
    registry: Arc<TimerRegistry>,
}

impl Timers {
    /// Create a fresh timer context
    pub fn new() -> Self {
        Self {
            service: TimerService::new(),
            registry: Arc::new(TimerRegistry::new()),
        }
    }

    /// The underlying timer service
    pub fn service(&self) -> &TimerService {
        &self.service
    }

    /// The underlying timer registry
    pub fn registry(&self) -> &TimerRegistry {
        &self.registry
    }

    /// Schedule a one-shot callback, registering it under `identity` (and
    /// `call_site`, when given)
    ///
    /// The registration is dropped automatically when the timer fires.
    pub fn schedule(
        &self,
        delay: Duration,
        identity: Option<&str>,
        call_site: Option<&str>,
        callback: impl FnOnce() + Send + 'static,
    ) -> TimerResult<TimerHandle> {
        let registry = self.registry.clone();
        let slot: Arc<OnceLock<TimerHandle>> = Arc::new(OnceLock::new());
        let fired_slot = slot.clone();

        let handle = self.service.create(delay, move || {
            if let Some(handle) = fired_slot.get() {
                registry.unregister(handle);
            }
            callback();
        })?;
        let _ = slot.set(handle.clone());

        if let Err(err) = self.registry.register(&handle, identity, call_site) {
            self.service.cancel(&handle);
            return Err(err);
        }

        Ok(handle)
    }

    /// Schedule a callback under a reentrant key, reusing a live timer
    ///
    /// If a timer already lives under `(identity, call_site)` it is
    /// returned as-is and `callback` is dropped; otherwise a new timer is
    /// scheduled and registered.
    pub fn schedule_reentrant(
        &self,
        identity: &str,
        call_site: &str,
        delay: Duration,
        callback: impl FnOnce() + Send + 'static,
    ) -> TimerResult<TimerHandle> {
        if let Some(existing) = self.registry.lookup_reentrant(identity, call_site) {
            debug!(identity, call_site, timer_id = ?existing.id(), "Reusing live reentrant timer");
            return Ok(existing);
        }
        self.schedule(delay, Some(identity), Some(call_site), callback)
    }

    /// Cancel every registered timer and clear the registry
    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all(&self.service)
    }

    /// Stop accepting new timers, then cancel everything registered
    ///
    /// Used on engine reload/shutdown so no orphaned callback fires
    /// against a torn-down environment.
    pub fn shutdown(&self) -> usize {
        self.service.shutdown();
        self.cancel_all()
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}
