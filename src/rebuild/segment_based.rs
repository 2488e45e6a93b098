//! Segment Based Rebuild
//!
//! User data rebuild, driven one victim segment at a time by the allocator.

use std::sync::Arc;

use super::behavior::{InitOutcome, RebuildCore};
use super::{NToMRebuild, RebuildBehavior, RebuildContext, RebuildResources};
use crate::error::{RebuildError, Result};
use crate::io::IoStatus;
use crate::scheduler::Progress;
use crate::types::{RebuildState, SegmentId, StripeId};

/// Answer of the allocator to a request for the next segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildTarget {
    Segment(SegmentId),
    /// None available right now
    RetryLater,
    /// Nothing left to rebuild
    Exhausted,
}

/// Segment bookkeeping of the allocator
pub trait SegmentAllocator: Send + Sync {
    fn allocate_rebuild_target_segment(&self) -> RebuildTarget;
    fn release_rebuild_segment(&self, segment: SegmentId);
    /// Segments still waiting to be rebuilt
    fn rebuild_target_segment_count(&self) -> u32;
}

/// Rebuilds every stripe of each segment the allocator hands out
pub struct SegmentBasedRebuild {
    core: RebuildCore,
    allocator: Arc<dyn SegmentAllocator>,
    methods: Vec<Arc<NToMRebuild>>,
}

impl SegmentBasedRebuild {
    pub fn new(
        ctx: Arc<RebuildContext>,
        resources: RebuildResources,
        allocator: Arc<dyn SegmentAllocator>,
        methods: Vec<Arc<NToMRebuild>>,
    ) -> Result<Arc<Self>> {
        if methods.is_empty() {
            return Err(RebuildError::Config(format!(
                "no rebuild method for partition {}",
                ctx.part
            )));
        }
        tracing::debug!(
            "SegmentBasedRebuild for {} with {} methods",
            ctx.part,
            methods.len()
        );
        Ok(Arc::new(Self {
            core: RebuildCore::new(ctx, resources),
            allocator,
            methods,
        }))
    }

    pub(crate) fn core(&self) -> &RebuildCore {
        &self.core
    }

    pub fn methods(&self) -> &[Arc<NToMRebuild>] {
        &self.methods
    }

    fn handle(self: &Arc<Self>) -> RebuildBehavior {
        RebuildBehavior::SegmentBased(Arc::clone(self))
    }

    pub fn rebuild(self: &Arc<Self>) -> Progress {
        let outcome = self.core.init_buffers("SegmentBasedRebuild", || {
            self.methods.iter().all(|method| method.init())
        });
        if outcome == InitOutcome::Retry {
            return Progress::Blocked;
        }

        let state = self.core.begin();
        if state.is_stopped() {
            return self.finish();
        }

        let remaining = self.allocator.rebuild_target_segment_count();
        self.update_progress(remaining);
        if remaining == 0 {
            return self.finish();
        }

        match self.allocator.allocate_rebuild_target_segment() {
            RebuildTarget::Segment(segment) => {
                tracing::info!(
                    "SegmentBasedRebuild of {}: segment {} allocated",
                    self.core.ctx.part,
                    segment
                );
                self.recover_segment(segment);
                Progress::Progressed
            }
            RebuildTarget::RetryLater => Progress::Blocked,
            RebuildTarget::Exhausted => self.finish(),
        }
    }

    fn recover_segment(self: &Arc<Self>, segment: SegmentId) {
        let ctx = &self.core.ctx;
        if let Some(logger) = &ctx.logger {
            logger.add_rebuilt_segment();
        }

        let stripes = ctx.size.stripes_per_segment;
        let base: StripeId = segment * stripes;
        ctx.set_task_cnt(stripes * self.methods.len() as u32);
        tracing::debug!(
            "SegmentBasedRebuild of {}: recover segment {}, stripes {}..{}",
            ctx.part,
            segment,
            base,
            base + stripes
        );

        for stripe_id in base..base + stripes {
            for method in &self.methods {
                let this = Arc::clone(self);
                method.recover(
                    ctx.array_index,
                    stripe_id,
                    Box::new(move |status| this.stripe_done(segment, stripe_id, status)),
                );
            }
        }
    }

    fn stripe_done(self: &Arc<Self>, segment: SegmentId, stripe_id: StripeId, status: IoStatus) {
        let ctx = &self.core.ctx;
        if !status.is_success() {
            tracing::error!(
                "Failed to recover stripe {} in partition {} ({}), status {}",
                stripe_id,
                ctx.part,
                ctx.raid_type,
                status
            );
            // The job ends now; the rest of the segment drains on its own
            if ctx.set_result(RebuildState::Fail) < RebuildState::Fail {
                self.core.reschedule(self.handle());
            }
        }

        if ctx.complete_task() {
            self.allocator.release_rebuild_segment(segment);
            tracing::debug!("SegmentBasedRebuild of {}: segment {} released", ctx.part, segment);
            self.core.reschedule(self.handle());
        }
    }

    fn finish(&self) -> Progress {
        self.core.finish("SegmentBasedRebuild")
    }

    fn update_progress(&self, remaining_segments: u32) {
        let ctx = &self.core.ctx;
        let remaining = remaining_segments as u64 * ctx.size.stripes_per_segment as u64;
        let done = (ctx.total_stripes() as u64).saturating_sub(remaining);
        ctx.update_progress(done);
    }
}
