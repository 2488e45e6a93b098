//! Stripe Based Rebuild
//!
//! Parity partitions: every window is locked as a whole before any of its
//! stripes is rebuilt.

use std::sync::Arc;

use super::sweep::{StripeSweep, SweepPolicy};
use super::{RebuildBehavior, RebuildContext};
use crate::locker::StripeLocker;
use crate::types::{RebuildState, StripeId};

/// Window policy of parity partitions
pub struct ParityWindow;

impl SweepPolicy for ParityWindow {
    const NAME: &'static str = "StripeBasedRebuild";

    fn lock_window(locker: &StripeLocker, base: StripeId, window: u32) -> u32 {
        if locker.try_lock_range(base, base + window - 1) {
            window
        } else {
            0
        }
    }

    fn write_allowed(state: RebuildState) -> bool {
        state == RebuildState::Rebuilding
    }

    fn source_chunks(ctx: &RebuildContext) -> usize {
        match ctx.pairs.first() {
            Some(pair) => pair.srcs.len().max(1),
            None => (ctx.size.chunks_per_stripe as usize).saturating_sub(1).max(1),
        }
    }

    fn handle(sweep: &Arc<StripeSweep<Self>>) -> RebuildBehavior {
        RebuildBehavior::StripeBased(Arc::clone(sweep))
    }
}

/// Parity rebuild over the whole stripe range of a partition
pub type StripeBasedRebuild = StripeSweep<ParityWindow>;
