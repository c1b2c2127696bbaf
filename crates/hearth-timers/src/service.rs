//! One-shot timer service over the tokio timer primitive
//!
//! Every delayed callback in the rule engine goes through this service
//! rather than touching `tokio::time` directly, so delay semantics are
//! testable against the paused clock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tracing::trace;

use crate::{TimerError, TimerResult};

/// Unique identifier of a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Lifecycle state of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Scheduled { fire_at: Instant },
    Cancelled,
    Fired,
}

struct TimerShared {
    id: TimerId,
    state: Mutex<TimerState>,
    notify: Notify,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cheaply clonable reference to a scheduled timer
///
/// One clone is held by whichever component created the timer, another by
/// the registry while the timer is registered. The timer's own lock
/// serializes state mutations between them and the firing task.
#[derive(Clone)]
pub struct TimerHandle {
    shared: Arc<TimerShared>,
}

impl TimerHandle {
    /// The timer's unique id
    pub fn id(&self) -> TimerId {
        self.shared.id
    }

    /// Whether the timer is still counting down
    pub fn is_pending(&self) -> bool {
        matches!(*self.shared.lock(), TimerState::Scheduled { .. })
    }

    /// Time remaining until the timer fires, or None if it already
    /// terminated
    pub fn fire_in(&self) -> Option<Duration> {
        match *self.shared.lock() {
            TimerState::Scheduled { fire_at } => {
                Some(fire_at.saturating_duration_since(Instant::now()))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.shared.id)
            .field("state", &*self.shared.lock())
            .finish()
    }
}

/// Schedules one-shot callbacks at absolute deadlines
///
/// Wraps the host runtime's delayed-execution primitive with reschedule
/// and cancel operations. After `shutdown()` every create request fails
/// fast with `SchedulingFailure`.
pub struct TimerService {
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

impl TimerService {
    /// Create a new timer service
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Schedule `callback` to run once after `delay`
    pub fn create(
        &self,
        delay: Duration,
        callback: impl FnOnce() + Send + 'static,
    ) -> TimerResult<TimerHandle> {
        self.create_at(Instant::now() + delay, callback)
    }

    /// Schedule `callback` to run once at `fire_at`
    pub fn create_at(
        &self,
        fire_at: Instant,
        callback: impl FnOnce() + Send + 'static,
    ) -> TimerResult<TimerHandle> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(TimerError::SchedulingFailure(
                "timer service is shut down".to_string(),
            ));
        }

        let runtime = Handle::try_current().map_err(|_| {
            TimerError::SchedulingFailure("no async runtime available".to_string())
        })?;

        let shared = Arc::new(TimerShared {
            id: TimerId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            state: Mutex::new(TimerState::Scheduled { fire_at }),
            notify: Notify::new(),
        });

        trace!(timer_id = ?shared.id, "Scheduling timer");
        runtime.spawn(run_timer(shared.clone(), Box::new(callback)));

        Ok(TimerHandle { shared })
    }

    /// Move a pending timer's deadline to `delay` from now
    pub fn reschedule(&self, handle: &TimerHandle, delay: Duration) -> TimerResult<()> {
        self.reschedule_at(handle, Instant::now() + delay)
    }

    /// Move a pending timer's deadline to `fire_at`
    pub fn reschedule_at(&self, handle: &TimerHandle, fire_at: Instant) -> TimerResult<()> {
        let mut state = handle.shared.lock();
        match *state {
            TimerState::Scheduled { .. } => {
                *state = TimerState::Scheduled { fire_at };
                drop(state);
                handle.shared.notify.notify_one();
                trace!(timer_id = ?handle.id(), "Rescheduled timer");
                Ok(())
            }
            _ => Err(TimerError::AlreadyTerminated),
        }
    }

    /// Stop a pending timer
    ///
    /// Idempotent; returns whether a still-pending timer was actually
    /// stopped.
    pub fn cancel(&self, handle: &TimerHandle) -> bool {
        let mut state = handle.shared.lock();
        match *state {
            TimerState::Scheduled { .. } => {
                *state = TimerState::Cancelled;
                drop(state);
                handle.shared.notify.notify_one();
                trace!(timer_id = ?handle.id(), "Cancelled timer");
                true
            }
            _ => false,
        }
    }

    /// Whether the timer is still counting down
    pub fn is_pending(&self, handle: &TimerHandle) -> bool {
        handle.is_pending()
    }

    /// Refuse all further create requests
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    /// Whether the service has been shut down
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

/// The timer task: sleeps until the deadline, re-reading state whenever a
/// reschedule or cancel pokes it.
///
/// The callback never runs while the timer's state lock is held, so it may
/// freely take controller or registry locks.
async fn run_timer(shared: Arc<TimerShared>, callback: Box<dyn FnOnce() + Send>) {
    let mut callback = Some(callback);
    loop {
        let deadline = match *shared.lock() {
            TimerState::Scheduled { fire_at } => fire_at,
            _ => return,
        };

        tokio::select! {
            _ = time::sleep_until(deadline) => {
                let fire = {
                    let mut state = shared.lock();
                    match *state {
                        TimerState::Scheduled { fire_at } if fire_at <= Instant::now() => {
                            *state = TimerState::Fired;
                            true
                        }
                        // Deadline moved while we slept, or a cancel won
                        // the race; re-read and go around.
                        _ => false,
                    }
                };
                if fire {
                    trace!(timer_id = ?shared.id, "Timer fired");
                    if let Some(cb) = callback.take() {
                        cb();
                    }
                    return;
                }
            }
            _ = shared.notify.notified() => {}
        }
    }
}
