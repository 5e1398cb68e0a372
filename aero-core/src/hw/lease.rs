//! Per-PWM write leases
//!
//! Detection needs exclusive write access to the PWM under test, and
//! the engine must never write an output mid-probe. Both subsystems
//! share one [`PwmLeases`] registry: detection acquires an output
//! before snapshotting it and holds the lease until restore, the
//! engine checks [`PwmLeases::is_held`] before every hardware write.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// Registry of currently-leased PWM inventory indices
#[derive(Debug, Default)]
pub struct PwmLeases {
    held: Mutex<HashSet<usize>>,
}

impl PwmLeases {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take exclusive write access to one PWM output.
    ///
    /// Returns `None` when the output is already leased.
    pub fn acquire(self: &Arc<Self>, index: usize) -> Option<PwmLease> {
        let mut held = self.held.lock();
        if !held.insert(index) {
            return None;
        }
        trace!(pwm_index = index, "lease acquired");
        Some(PwmLease {
            registry: Arc::clone(self),
            index,
        })
    }

    /// Whether an output is currently leased
    pub fn is_held(&self, index: usize) -> bool {
        self.held.lock().contains(&index)
    }
}

/// RAII lease on one PWM output; dropping releases it
#[derive(Debug)]
pub struct PwmLease {
    registry: Arc<PwmLeases>,
    index: usize,
}

impl PwmLease {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for PwmLease {
    fn drop(&mut self) {
        self.registry.held.lock().remove(&self.index);
        trace!(pwm_index = self.index, "lease released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_is_exclusive_until_dropped() {
        let leases = PwmLeases::new();
        let guard = leases.acquire(3).expect("first acquire succeeds");
        assert!(leases.is_held(3));
        assert!(leases.acquire(3).is_none());
        assert_eq!(guard.index(), 3);

        drop(guard);
        assert!(!leases.is_held(3));
        assert!(leases.acquire(3).is_some());
    }

    #[test]
    fn leases_are_independent_per_index() {
        let leases = PwmLeases::new();
        let _a = leases.acquire(0).unwrap();
        let _b = leases.acquire(1).unwrap();
        assert!(leases.is_held(0));
        assert!(leases.is_held(1));
        assert!(!leases.is_held(2));
    }
}
