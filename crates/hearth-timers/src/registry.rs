//! Process-wide registry of live timers
//!
//! The registry keys timers two ways: by a caller-supplied logical
//! identity (a rule id, typically) and by a *reentrant key* combining that
//! identity with a stable call-site tag, so that repeated requests from
//! the same piece of logic reuse one timer while distinct call sites with
//! the same identity stay separate.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use crate::service::{TimerHandle, TimerService};
use crate::{TimerError, TimerResult};

/// Key identifying "this logic asking for this timer"
///
/// Rust has no portable notion of a closure's source location, so the
/// call-site half of the key is an explicit caller-supplied tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReentrantKey {
    pub identity: String,
    pub call_site: String,
}

impl ReentrantKey {
    pub fn new(identity: impl Into<String>, call_site: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            call_site: call_site.into(),
        }
    }
}

impl fmt::Display for ReentrantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identity, self.call_site)
    }
}

#[derive(Default)]
struct RegistryInner {
    by_identity: HashMap<String, Vec<TimerHandle>>,
    by_reentrant: HashMap<ReentrantKey, TimerHandle>,
}

/// Table of live timers, shared by every trigger in the process
///
/// A single coarse lock guards both maps; operations are O(1) and brief,
/// and the register/unregister/cancel_all contract is atomic with respect
/// to concurrent callers.
pub struct TimerRegistry {
    inner: Mutex<RegistryInner>,
}

impl TimerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a timer under an identity and, optionally, a reentrant key
    ///
    /// A live timer already occupying the reentrant key is an error; the
    /// registry never cancels on the caller's behalf, so the caller must
    /// cancel the incumbent first (or reuse it via `lookup_reentrant`).
    pub fn register(
        &self,
        handle: &TimerHandle,
        identity: Option<&str>,
        call_site: Option<&str>,
    ) -> TimerResult<()> {
        let mut inner = self.lock();

        if let (Some(identity), Some(call_site)) = (identity, call_site) {
            let key = ReentrantKey::new(identity, call_site);
            if let Some(existing) = inner.by_reentrant.get(&key) {
                if existing.is_pending() {
                    return Err(TimerError::ReentrantKeyOccupied(key));
                }
            }
            trace!(%key, timer_id = ?handle.id(), "Registering reentrant timer");
            inner.by_reentrant.insert(key, handle.clone());
        }

        if let Some(identity) = identity {
            let bucket = inner.by_identity.entry(identity.to_string()).or_default();
            bucket.retain(TimerHandle::is_pending);
            bucket.push(handle.clone());
        }

        Ok(())
    }

    /// Find the live timer under a reentrant key, pruning a dead entry
    pub fn lookup_reentrant(&self, identity: &str, call_site: &str) -> Option<TimerHandle> {
        let mut inner = self.lock();
        let key = ReentrantKey::new(identity, call_site);
        match inner.by_reentrant.get(&key) {
            Some(handle) if handle.is_pending() => Some(handle.clone()),
            Some(_) => {
                inner.by_reentrant.remove(&key);
                None
            }
            None => None,
        }
    }

    /// All live timers registered under an identity
    pub fn lookup_identity(&self, identity: &str) -> Vec<TimerHandle> {
        let inner = self.lock();
        inner
            .by_identity
            .get(identity)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|h| h.is_pending())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove a timer from both maps; no-op when absent
    pub fn unregister(&self, handle: &TimerHandle) {
        let mut inner = self.lock();
        inner.by_reentrant.retain(|_, h| h.id() != handle.id());
        inner.by_identity.retain(|_, bucket| {
            bucket.retain(|h| h.id() != handle.id());
            !bucket.is_empty()
        });
    }

    /// Cancel every registered timer and clear both maps
    ///
    /// Returns the number of timers that were still pending. A timer
    /// already in the process of firing is a race the caller tolerates.
    pub fn cancel_all(&self, service: &TimerService) -> usize {
        let mut inner = self.lock();
        let mut cancelled = 0;

        for (_, handle) in inner.by_reentrant.drain() {
            if service.cancel(&handle) {
                cancelled += 1;
            }
        }
        for (_, bucket) in inner.by_identity.drain() {
            for handle in bucket {
                if service.cancel(&handle) {
                    cancelled += 1;
                }
            }
        }

        debug!(cancelled, "Cancelled all registered timers");
        cancelled
    }

    /// Number of identities with registered timers
    pub fn identity_count(&self) -> usize {
        self.lock().by_identity.len()
    }

    /// Number of registered reentrant keys
    pub fn reentrant_count(&self) -> usize {
        self.lock().by_reentrant.len()
    }
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_register_and_lookup_reentrant() {
        let service = TimerService::new();
        let registry = TimerRegistry::new();

        let handle = service.create(Duration::from_secs(10), || {}).unwrap();
        registry
            .register(&handle, Some("rule_1"), Some("held_for"))
            .unwrap();

        let found = registry.lookup_reentrant("rule_1", "held_for").unwrap();
        assert_eq!(found.id(), handle.id());
        assert!(registry.lookup_reentrant("rule_1", "other_site").is_none());
        assert!(registry.lookup_reentrant("rule_2", "held_for").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_occupied_reentrant_key_is_rejected() {
        let service = TimerService::new();
        let registry = TimerRegistry::new();

        let first = service.create(Duration::from_secs(10), || {}).unwrap();
        registry
            .register(&first, Some("rule_1"), Some("held_for"))
            .unwrap();

        let second = service.create(Duration::from_secs(10), || {}).unwrap();
        let err = registry
            .register(&second, Some("rule_1"), Some("held_for"))
            .unwrap_err();
        assert!(matches!(err, TimerError::ReentrantKeyOccupied(_)));

        // After cancelling the incumbent the key is free again
        service.cancel(&first);
        registry
            .register(&second, Some("rule_1"), Some("held_for"))
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_removes_from_both_maps() {
        let service = TimerService::new();
        let registry = TimerRegistry::new();

        let handle = service.create(Duration::from_secs(10), || {}).unwrap();
        registry
            .register(&handle, Some("rule_1"), Some("held_for"))
            .unwrap();

        registry.unregister(&handle);
        assert_eq!(registry.identity_count(), 0);
        assert_eq!(registry.reentrant_count(), 0);

        // Unregistering again is a no-op
        registry.unregister(&handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_clears_and_cancels() {
        let service = TimerService::new();
        let registry = TimerRegistry::new();

        let a = service.create(Duration::from_secs(10), || {}).unwrap();
        let b = service.create(Duration::from_secs(10), || {}).unwrap();
        registry.register(&a, Some("rule_1"), Some("held_for")).unwrap();
        registry.register(&b, Some("rule_2"), None).unwrap();

        let cancelled = registry.cancel_all(&service);
        assert_eq!(cancelled, 2);
        assert_eq!(registry.identity_count(), 0);
        assert_eq!(registry.reentrant_count(), 0);
        assert!(!a.is_pending());
        assert!(!b.is_pending());
    }
}
