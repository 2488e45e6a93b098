//! Locker state
//!
//! One working set, tagged with the mode it serves.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::types::{LockerMode, StripeId};

struct WorkingSet {
    locked: HashSet<StripeId>,

    /// A transition away from this state is pending
    draining: bool,
}

/// Working set of one locker mode
///
/// A NORMAL state only agrees to become BUSY and a BUSY state only agrees to
/// become NORMAL, and only while nothing is locked.
pub struct StripeLockerState {
    mode: LockerMode,
    set: Mutex<WorkingSet>,
}

impl StripeLockerState {
    pub fn new(mode: LockerMode) -> Self {
        Self {
            mode,
            set: Mutex::new(WorkingSet {
                locked: HashSet::new(),
                draining: false,
            }),
        }
    }

    pub fn mode(&self) -> LockerMode {
        self.mode
    }

    /// Lock `id`; false while draining or when `id` is already held
    pub fn try_lock(&self, id: StripeId) -> bool {
        let mut set = self.set.lock();
        if set.draining {
            return false;
        }
        set.locked.insert(id)
    }

    /// Release `id` if held
    pub fn unlock(&self, id: StripeId) -> bool {
        self.set.lock().locked.remove(&id)
    }

    /// Whether this state may become `target` right now
    ///
    /// Never mutates the working set; a false answer means retry later.
    pub fn state_change(&self, target: LockerMode) -> bool {
        let allowed = match self.mode {
            LockerMode::Normal => target == LockerMode::Busy,
            LockerMode::Busy => target == LockerMode::Normal,
        };
        if !allowed {
            return false;
        }
        self.set.lock().locked.is_empty()
    }

    /// Number of ids currently locked
    pub fn count(&self) -> usize {
        self.set.lock().locked.len()
    }

    pub fn is_locked(&self, id: StripeId) -> bool {
        self.set.lock().locked.contains(&id)
    }

    pub fn is_draining(&self) -> bool {
        self.set.lock().draining
    }

    pub(crate) fn set_draining(&self, draining: bool) {
        self.set.lock().draining = draining;
    }
}
