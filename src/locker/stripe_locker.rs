//! Stripe locker
//!
//! NORMAL and BUSY working sets of one array partition, with exactly one of
//! them active at a time.

use parking_lot::Mutex;

use super::StripeLockerState;
use crate::types::{LockerMode, StripeId};

/// Stripe exclusion for one array partition
///
/// ## Concurrency:
/// - `active` serializes routing against mode changes
/// - each state guards its own working set
/// - lock order is always `active` → state
pub struct StripeLocker {
    normal: StripeLockerState,
    busy: StripeLockerState,
    active: Mutex<LockerMode>,
}

impl StripeLocker {
    /// New locker in NORMAL mode
    pub fn new() -> Self {
        Self {
            normal: StripeLockerState::new(LockerMode::Normal),
            busy: StripeLockerState::new(LockerMode::Busy),
            active: Mutex::new(LockerMode::Normal),
        }
    }

    pub fn mode(&self) -> LockerMode {
        *self.active.lock()
    }

    /// Lock `id` in the active mode
    pub fn try_lock(&self, id: StripeId) -> bool {
        let active = self.active.lock();
        self.state(*active).try_lock(id)
    }

    /// Lock every id in `from..=to`, or none of them
    pub fn try_lock_range(&self, from: StripeId, to: StripeId) -> bool {
        let active = self.active.lock();
        let state = self.state(*active);

        for id in from..=to {
            if !state.try_lock(id) {
                for held in from..id {
                    state.unlock(held);
                }
                return false;
            }
        }
        true
    }

    /// Release `id`
    pub fn unlock(&self, id: StripeId) {
        let active = self.active.lock();
        if !self.state(*active).unlock(id) {
            // Ids only outlive a transition if a caller unlocks twice
            self.normal.unlock(id);
            self.busy.unlock(id);
        }
    }

    /// Release every id in `from..=to`
    pub fn unlock_range(&self, from: StripeId, to: StripeId) {
        for id in from..=to {
            self.unlock(id);
        }
    }

    /// Switch the active mode to `target`
    ///
    /// Returns false while the active working set still holds ids; until the
    /// transition completes the active state refuses new locks. Asking for
    /// the mode that is already active succeeds and abandons a pending
    /// transition.
    pub fn try_change(&self, target: LockerMode) -> bool {
        let mut active = self.active.lock();
        let current = self.state(*active);

        if *active == target {
            current.set_draining(false);
            return true;
        }

        current.set_draining(true);
        if !current.state_change(target) {
            tracing::debug!(
                "Locker change to {:?} deferred, {} stripes still held",
                target,
                current.count()
            );
            return false;
        }

        current.set_draining(false);
        *active = target;
        tracing::debug!("Locker changed to {:?}", target);
        true
    }

    /// Ids held in the active mode
    pub fn count(&self) -> usize {
        let active = self.active.lock();
        self.state(*active).count()
    }

    pub fn is_locked(&self, id: StripeId) -> bool {
        self.normal.is_locked(id) || self.busy.is_locked(id)
    }

    /// Working set of one mode
    pub fn state(&self, mode: LockerMode) -> &StripeLockerState {
        match mode {
            LockerMode::Normal => &self.normal,
            LockerMode::Busy => &self.busy,
        }
    }
}

impl Default for StripeLocker {
    fn default() -> Self {
        Self::new()
    }
}
