//! Rebuild Behavior
//!
//! The closed set of rebuild strategies and the state they all share.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use super::{Raid1Rebuild, RebuildContext, RebuildResources, SegmentBasedRebuild, StripeBasedRebuild};
use crate::scheduler::{Event, Progress};
use crate::types::RebuildState;

/// A partition rebuild strategy
///
/// Cloning is cheap; every clone drives the same job.
#[derive(Clone)]
pub enum RebuildBehavior {
    /// User data, one allocator-supplied segment at a time
    SegmentBased(Arc<SegmentBasedRebuild>),
    /// Mirrored metadata, stripe windows under the BUSY locker
    Raid1(Arc<Raid1Rebuild>),
    /// Parity metadata, whole stripe windows locked at once
    StripeBased(Arc<StripeBasedRebuild>),
}

impl RebuildBehavior {
    /// Advance the job by one unit of work
    pub fn rebuild(&self) -> Progress {
        match self {
            RebuildBehavior::SegmentBased(b) => b.rebuild(),
            RebuildBehavior::Raid1(b) => b.rebuild(),
            RebuildBehavior::StripeBased(b) => b.rebuild(),
        }
    }

    /// Cancel the job; in-flight stripes still complete. A job that already
    /// ended keeps its result.
    pub fn stop_rebuilding(&self) {
        let ctx = self.context();
        if ctx.cancel() {
            tracing::info!("Rebuild of {} requested to stop", ctx.part);
        }
    }

    pub fn context(&self) -> &Arc<RebuildContext> {
        &self.core().ctx
    }

    /// Hand the first unit of work to the scheduler
    pub fn start(&self) {
        tracing::info!(
            "Rebuild of {} ({}) started as {}",
            self.context().part,
            self.context().raid_type,
            self.name()
        );
        self.core().reschedule(self.clone());
    }

    pub fn name(&self) -> &'static str {
        match self {
            RebuildBehavior::SegmentBased(_) => "SegmentBasedRebuild",
            RebuildBehavior::Raid1(_) => "Raid1Rebuild",
            RebuildBehavior::StripeBased(_) => "StripeBasedRebuild",
        }
    }

    pub fn total_stripes(&self) -> u32 {
        self.context().total_stripes()
    }

    /// Failed buffer allocation attempts so far
    pub fn init_retries(&self) -> u32 {
        self.core().init_retries()
    }

    pub(crate) fn core(&self) -> &RebuildCore {
        match self {
            RebuildBehavior::SegmentBased(b) => b.core(),
            RebuildBehavior::Raid1(b) => b.core(),
            RebuildBehavior::StripeBased(b) => b.core(),
        }
    }
}

// =============================================================================
// Shared State
// =============================================================================

/// Outcome of one buffer initialization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InitOutcome {
    Ready,
    Retry,
    /// Retry budget spent; the job is FAIL
    Failed,
}

/// State composed into every behavior
pub(crate) struct RebuildCore {
    pub(crate) ctx: Arc<RebuildContext>,
    pub(crate) resources: RebuildResources,
    initialized: AtomicBool,
    init_retries: AtomicU32,
}

impl RebuildCore {
    pub(crate) fn new(ctx: Arc<RebuildContext>, resources: RebuildResources) -> Self {
        Self {
            ctx,
            resources,
            initialized: AtomicBool::new(false),
            init_retries: AtomicU32::new(0),
        }
    }

    /// Run `alloc` until it succeeds once, counting failures against the
    /// configured retry budget
    pub(crate) fn init_buffers<F>(&self, name: &str, alloc: F) -> InitOutcome
    where
        F: FnOnce() -> bool,
    {
        if self.initialized.load(Ordering::Acquire) {
            return InitOutcome::Ready;
        }
        if alloc() {
            self.initialized.store(true, Ordering::Release);
            tracing::info!("{} initialized for {}", name, self.ctx.part);
            return InitOutcome::Ready;
        }

        let max = self.resources.config.init_retry_max;
        let retried = self.init_retries.fetch_add(1, Ordering::AcqRel) + 1;
        if retried >= max {
            tracing::error!(
                "{} of {} could not secure buffers, retried {} times",
                name,
                self.ctx.part,
                retried
            );
            self.ctx.set_result(RebuildState::Fail);
            return InitOutcome::Failed;
        }

        if retried % (max / 10).max(1) == 0 {
            tracing::warn!(
                "{} of {} waiting for buffers, retry {}/{}",
                name,
                self.ctx.part,
                retried,
                max
            );
        }
        InitOutcome::Retry
    }

    pub(crate) fn init_retries(&self) -> u32 {
        self.init_retries.load(Ordering::Acquire)
    }

    /// Mark the job as running unless it already stopped
    pub(crate) fn begin(&self) -> RebuildState {
        self.ctx.set_result(RebuildState::Rebuilding);
        self.ctx.result()
    }

    /// Settle the final state: PASS unless already CANCELLED or FAIL
    pub(crate) fn finalize(&self, name: &str) -> RebuildState {
        let ctx = &self.ctx;
        match ctx.result() {
            RebuildState::Cancelled => {
                tracing::warn!("Partition {} ({}) rebuilding stopped", ctx.part, ctx.raid_type);
            }
            RebuildState::Fail => {
                tracing::warn!("Partition {} ({}) rebuilding failed", ctx.part, ctx.raid_type);
            }
            _ => {
                ctx.set_result(RebuildState::Pass);
                ctx.update_progress(ctx.total_stripes() as u64);
                tracing::debug!(
                    "Partition {} ({}) rebuilding done by {}",
                    ctx.part,
                    ctx.raid_type,
                    name
                );
            }
        }
        ctx.result()
    }

    /// Settle the result and queue the completion notice, once per job
    pub(crate) fn finish(&self, name: &str) -> Progress {
        if !self.ctx.is_completed() {
            self.finalize(name);
            self.emit_completed();
        }
        Progress::Done
    }

    /// Queue the completion notice; only the first call per job does so
    pub(crate) fn emit_completed(&self) {
        if self.ctx.mark_completed() {
            self.resources
                .scheduler
                .enqueue(Box::new(RebuildCompleted::new(Arc::clone(&self.ctx))));
        }
    }

    /// Queue the next unit of work
    pub(crate) fn reschedule(&self, behavior: RebuildBehavior) {
        self.resources.scheduler.enqueue(Box::new(Rebuilder::new(behavior)));
    }
}

// =============================================================================
// Events
// =============================================================================

/// Drives one step of a behavior
pub struct Rebuilder {
    behavior: RebuildBehavior,
}

impl Rebuilder {
    pub fn new(behavior: RebuildBehavior) -> Self {
        Self { behavior }
    }
}

impl Event for Rebuilder {
    fn execute(&mut self) -> Progress {
        self.behavior.rebuild()
    }

    fn name(&self) -> &'static str {
        "Rebuilder"
    }
}

/// Delivers the job result to the context's completion handler
pub struct RebuildCompleted {
    ctx: Arc<RebuildContext>,
}

impl RebuildCompleted {
    pub fn new(ctx: Arc<RebuildContext>) -> Self {
        Self { ctx }
    }
}

impl Event for RebuildCompleted {
    fn execute(&mut self) -> Progress {
        let result = self.ctx.rebuild_result();
        tracing::info!(
            "Rebuild of {} in array {} completed: {}",
            self.ctx.part,
            self.ctx.array_name,
            result.result
        );
        if let Some(handler) = self.ctx.take_complete_handler() {
            handler(result);
        }
        Progress::Done
    }

    fn name(&self) -> &'static str {
        "RebuildCompleted"
    }
}
