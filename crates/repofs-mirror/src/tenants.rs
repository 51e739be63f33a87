// tenants.rs — Per-tenant locks and reconciliation state.
//
// Each (org, repo) gets one `Mutex<TenantState>`. Holding its guard is the
// tenant's critical section: synchronize plus the read or mutation that
// follows run inside it, so two requests for the same tenant never
// interleave their clone/pull/write/push steps. Different tenants have
// different mutexes and never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use repofs_workspace::TenantId;

/// Commit attempts a pending change gets before it is discarded.
pub const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// A local change whose commit failed and must be recorded before the
/// tenant is served again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
    pub path: String,
    pub message: String,

    /// Failed commit attempts so far.
    pub attempts: u32,
}

impl PendingCommit {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            attempts: 0,
        }
    }
}

/// Reconciliation state of one tenant mirror.
#[derive(Debug, Default)]
pub struct TenantState {
    /// A push failed; the mirror holds revisions the remote lacks.
    pub locally_ahead: bool,

    /// Local changes not yet committed, oldest first.
    pub unrecorded: Vec<PendingCommit>,
}

impl TenantState {
    /// Whether an earlier request left propagation unfinished.
    pub fn needs_reconcile(&self) -> bool {
        self.locally_ahead || !self.unrecorded.is_empty()
    }
}

/// Registry of tenant locks, created on first use. A slot is released
/// again when its tenant never got a mirror.
#[derive(Debug, Default)]
pub struct TenantLocks {
    slots: Mutex<HashMap<TenantId, Arc<Mutex<TenantState>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock slot for `tenant`.
    pub fn slot(&self, tenant: &TenantId) -> Arc<Mutex<TenantState>> {
        let mut slots = lock(&self.slots);
        slots.entry(tenant.clone()).or_default().clone()
    }

    /// Remove `tenant`'s slot if `slot` is it and nobody else holds or
    /// waits on it. Callers still holding the slot's guard may call this;
    /// a request arriving afterwards gets a fresh slot.
    pub fn release(&self, tenant: &TenantId, slot: &Arc<Mutex<TenantState>>) {
        let mut slots = lock(&self.slots);
        let idle = match slots.get(tenant) {
            // One reference in the map, one held by the caller.
            Some(current) => Arc::ptr_eq(current, slot) && Arc::strong_count(slot) == 2,
            None => false,
        };
        if idle {
            slots.remove(tenant);
        }
    }

    /// Number of tenants with a live slot.
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Acquire a mutex, recovering the data if a previous holder panicked.
///
/// Tenant state is a flag and a queue that are updated in single
/// statements, so a panic elsewhere cannot leave them half-written.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn tenant(org: &str, repo: &str) -> TenantId {
        TenantId::new(org, repo).unwrap()
    }

    #[test]
    fn same_tenant_shares_a_slot() {
        let locks = TenantLocks::new();
        let a = locks.slot(&tenant("acme", "site"));
        let b = locks.slot(&tenant("acme", "site"));
        let c = locks.slot(&tenant("acme", "docs"));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn state_persists_between_acquisitions() {
        let locks = TenantLocks::new();
        let t = tenant("acme", "site");

        lock(&locks.slot(&t)).locally_ahead = true;
        let slot = locks.slot(&t);
        assert!(lock(&slot).locally_ahead);
    }

    #[test]
    fn idle_slot_is_released() {
        let locks = TenantLocks::new();
        let t = tenant("acme", "site");

        let slot = locks.slot(&t);
        {
            let _guard = lock(&slot);
            locks.release(&t, &slot);
        }
        assert!(locks.is_empty());

        // A new request gets its own slot.
        let fresh = locks.slot(&t);
        assert!(!Arc::ptr_eq(&slot, &fresh));
    }

    #[test]
    fn contended_slot_is_kept() {
        let locks = TenantLocks::new();
        let t = tenant("acme", "site");

        let slot = locks.slot(&t);
        let waiting = locks.slot(&t);
        locks.release(&t, &slot);
        assert_eq!(locks.len(), 1);
        assert!(Arc::ptr_eq(&waiting, &locks.slot(&t)));
    }

    #[test]
    fn same_tenant_is_mutually_exclusive() {
        let locks = Arc::new(TenantLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let slot = locks.slot(&tenant("acme", "site"));
                    let _guard = lock(&slot);
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn poisoned_slot_is_recovered() {
        let locks = Arc::new(TenantLocks::new());
        let t = tenant("acme", "site");

        let slot = locks.slot(&t);
        let _ = thread::spawn(move || {
            let _guard = slot.lock().unwrap();
            panic!("request handler panicked");
        })
        .join();

        let slot = locks.slot(&t);
        let state = lock(&slot);
        assert!(!state.locally_ahead);
        assert!(state.unrecorded.is_empty());
    }
}
