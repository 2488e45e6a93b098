//! Stripe Sweep
//!
//! Walks the whole stripe range of a metadata partition in windows of
//! `stripes_per_segment` stripes while the locker is held in BUSY mode,
//! rebuilding each stripe through the degraded read path.
//!
//! ## Window
//! ```text
//!   base ──► lock window (policy) ──► per locked stripe:
//!              │
//!   dst slot ─► RebuildRead ─► write to faulty chunk ─► complete
//!                                                          │
//!                 return slot, unlock, count down ◄────────┘
//!                               │ (last one)
//!                               ▼
//!                           reschedule
//! ```
//! At the end of the range, or once stopped, the locker is switched back to
//! NORMAL before completion is emitted.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::behavior::{InitOutcome, RebuildCore};
use super::recovery_base::{take_buffer, RecoveryBase};
use super::{RebuildBehavior, RebuildContext, RebuildResources};
use crate::buffer::BufferPool;
use crate::error::{RebuildError, Result};
use crate::io::{IoDirection, IoRequest, IoStatus};
use crate::locker::StripeLocker;
use crate::recover::{rejection_status, RebuildRead};
use crate::scheduler::Progress;
use crate::types::{FtBlkAddr, LockerMode, RebuildState, StripeId};

/// What distinguishes one sweeping strategy from another
pub trait SweepPolicy: Sized + Send + Sync + 'static {
    /// Name used in log lines
    const NAME: &'static str;

    /// Lock stripes from `base`, at most `window` of them; returns how many
    /// consecutive stripes starting at `base` are now held
    fn lock_window(locker: &StripeLocker, base: StripeId, window: u32) -> u32;

    /// Whether a recovered stripe may still be written in `state`
    fn write_allowed(state: RebuildState) -> bool;

    /// Source chunks one degraded read needs
    fn source_chunks(ctx: &RebuildContext) -> usize;

    fn handle(sweep: &Arc<StripeSweep<Self>>) -> RebuildBehavior;
}

/// Stripe-window rebuild parameterized by its policy
pub struct StripeSweep<P: SweepPolicy> {
    core: RebuildCore,
    locker: Arc<StripeLocker>,
    rebuild_read: RebuildRead,

    /// Source side feeds the degraded reads, destination side holds the
    /// rebuilt chunk until it is written
    buffers: RecoveryBase,

    /// First stripe of the next window
    base_stripe: AtomicU32,

    _policy: PhantomData<P>,
}

impl<P: SweepPolicy> StripeSweep<P> {
    pub fn new(
        ctx: Arc<RebuildContext>,
        resources: RebuildResources,
        locker: Arc<StripeLocker>,
    ) -> Result<Arc<Self>> {
        if ctx.translator.is_none() {
            return Err(RebuildError::Config(format!(
                "partition {} has no address translator",
                ctx.part
            )));
        }

        let chunk = ctx.size.chunk_bytes() as usize;
        let buffers = RecoveryBase::new(
            chunk * P::source_chunks(&ctx),
            chunk,
            ctx.size.stripes_per_segment as usize,
            Arc::clone(&resources.pool_factory),
            resources.config.numa_hint,
        );
        tracing::debug!("{} for {}", P::NAME, ctx.part);

        Ok(Arc::new(Self {
            rebuild_read: resources.rebuild_read(),
            core: RebuildCore::new(ctx, resources),
            locker,
            buffers,
            base_stripe: AtomicU32::new(0),
            _policy: PhantomData,
        }))
    }

    pub(crate) fn core(&self) -> &RebuildCore {
        &self.core
    }

    /// First stripe of the next window
    pub fn base_stripe(&self) -> StripeId {
        self.base_stripe.load(Ordering::Acquire)
    }

    /// Read and destination pools, once the first call allocated them
    pub fn pools(&self) -> Option<(Arc<BufferPool>, Arc<BufferPool>)> {
        Some((self.buffers.src_buffer()?, self.buffers.dest_buffer()?))
    }

    pub fn rebuild(self: &Arc<Self>) -> Progress {
        let ctx = &self.core.ctx;
        let owner = format!("{}_{}", P::NAME, ctx.part);
        if self.core.init_buffers(P::NAME, || self.buffers.init(&owner)) == InitOutcome::Retry {
            return Progress::Blocked;
        }

        let state = self.core.begin();
        let total = ctx.total_stripes();
        let base = self.base_stripe();
        ctx.update_progress(base as u64);

        if base >= total || state.is_stopped() {
            if !self.locker.try_change(LockerMode::Normal) {
                tracing::debug!(
                    "Partition {} rebuild done, but waiting lock release",
                    ctx.part
                );
                return Progress::Blocked;
            }
            return self.core.finish(P::NAME);
        }

        if base == 0 && !self.locker.try_change(LockerMode::Busy) {
            return Progress::Blocked;
        }

        let window = ctx.size.stripes_per_segment.min(total - base);
        let locked = P::lock_window(&self.locker, base, window);
        if locked == 0 {
            return Progress::Blocked;
        }

        ctx.set_task_cnt(locked);
        self.base_stripe.store(base + locked, Ordering::Release);
        tracing::debug!("{} of {}: from {}, count {}", P::NAME, ctx.part, base, locked);

        for stripe_id in base..base + locked {
            self.recover_stripe(stripe_id);
        }
        Progress::Progressed
    }

    fn recover_stripe(self: &Arc<Self>, stripe_id: StripeId) {
        let ctx = &self.core.ctx;
        let (Some(read_pool), Some(dst_pool)) =
            (self.buffers.src_buffer(), self.buffers.dest_buffer())
        else {
            self.complete(stripe_id, None, IoStatus::BUFFER_EXHAUSTED);
            return;
        };

        let fta = FtBlkAddr {
            stripe_id,
            offset: ctx.fault_idx as u64 * ctx.size.blks_per_chunk as u64,
        };
        let Some(addr) = ctx.translate(fta) else {
            self.complete(stripe_id, None, IoStatus::GENERIC_ERROR);
            return;
        };

        let buffer = take_buffer(&dst_pool);
        let this = Arc::clone(self);
        let request = IoRequest::new(IoDirection::Write, addr, buffer, ctx.array_index)
            .with_callback(move |io, status| this.write(stripe_id, io, status));

        if let Err(rejected) = self.rebuild_read.recover(request, Some(&read_pool)) {
            tracing::error!(
                "Failed to recover stripe {} in partition {} ({}): {}",
                stripe_id,
                ctx.part,
                ctx.raid_type,
                rejected.error
            );
            ctx.set_result(RebuildState::Fail);
            let status = rejection_status(&rejected.error);
            self.complete(stripe_id, Some(rejected.request), status);
        }
    }

    /// Recovered data is in `io`; write it unless the job state forbids it
    fn write(self: &Arc<Self>, stripe_id: StripeId, mut io: IoRequest, status: IoStatus) {
        if !status.is_success() {
            self.complete(stripe_id, Some(io), status);
            return;
        }
        let state = self.core.ctx.result();
        if !P::write_allowed(state) {
            tracing::debug!("{}: stripe {} not written, job is {}", P::NAME, stripe_id, state);
            self.release(stripe_id, Some(io));
            return;
        }

        let this = Arc::clone(self);
        io.set_callback(move |io, status| this.complete(stripe_id, Some(io), status));
        self.core.resources.submitter.submit(io);
    }

    fn complete(self: &Arc<Self>, stripe_id: StripeId, io: Option<IoRequest>, status: IoStatus) {
        if !status.is_success() {
            let ctx = &self.core.ctx;
            tracing::error!(
                "Rebuild of stripe {} in partition {} failed with {}",
                stripe_id,
                ctx.part,
                status
            );
            ctx.set_result(RebuildState::Fail);
        }
        self.release(stripe_id, io);
    }

    /// Return the slot, unlock the stripe and count it down
    fn release(self: &Arc<Self>, stripe_id: StripeId, io: Option<IoRequest>) {
        let ctx = &self.core.ctx;
        if let (Some(io), Some(pool)) = (io, self.buffers.dest_buffer()) {
            pool.return_buffer(io.buffer);
        }

        self.locker.unlock(stripe_id);
        if ctx.complete_task() {
            self.core.reschedule(P::handle(self));
        }
    }
}
