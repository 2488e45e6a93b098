//! RAID1 Rebuild
//!
//! Mirror copy of the faulty chunk, one stripe window at a time.

use std::sync::Arc;

use super::sweep::{StripeSweep, SweepPolicy};
use super::{RebuildBehavior, RebuildContext};
use crate::locker::StripeLocker;
use crate::types::{RebuildState, StripeId};

/// Window policy of mirrored partitions
///
/// Locks stripes one by one and stops at the first one already held, so
/// a window may come out shorter than `stripes_per_segment`.
pub struct MirrorWindow;

impl SweepPolicy for MirrorWindow {
    const NAME: &'static str = "Raid1Rebuild";

    fn lock_window(locker: &StripeLocker, base: StripeId, window: u32) -> u32 {
        let mut locked = 0;
        while locked < window && locker.try_lock(base + locked) {
            locked += 1;
        }
        locked
    }

    fn write_allowed(state: RebuildState) -> bool {
        state != RebuildState::Fail
    }

    fn source_chunks(_ctx: &RebuildContext) -> usize {
        1
    }

    fn handle(sweep: &Arc<StripeSweep<Self>>) -> RebuildBehavior {
        RebuildBehavior::Raid1(Arc::clone(sweep))
    }
}

/// Mirror rebuild over the whole stripe range of a partition
pub type Raid1Rebuild = StripeSweep<MirrorWindow>;
