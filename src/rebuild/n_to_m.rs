//! N-to-M Rebuild
//!
//! Stripe-granularity data movement: read N source chunks, recover, write M
//! destination chunks.
//!
//! ## Pipeline
//! ```text
//!   recover(stripe)
//!       │
//!       ▼
//!   [read]  src pool slot ──split──► N sub-reads ──(all done)──┐
//!                                                              ▼
//!   [read done] failed? ── next plan exists ──► advance cursor, redo on it
//!                 │                 └─ none ──► callback(status)
//!                 ▼ ok
//!   [recover] dst pool slot ◄── recover_func(dst, src, size)
//!                 │
//!                 ▼
//!   [write] ──split──► M sub-writes ──(all done)──► callback(status)
//! ```
//! Only read failures move the cursor; write failures are reported as is.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;

use super::recovery_base::{take_buffer, RecoveryBase};
use super::{FailoverCursor, RebuildPair, RebuildResources};
use crate::buffer::BufferPool;
use crate::io::{submit_split, IoDirection, IoStatus};
use crate::types::{DeviceId, PartitionPhysicalSize, PhysicalBlkAddr, StripeId};

/// Called once per stripe with the final status
pub type StripeDone = Box<dyn FnOnce(IoStatus) + Send>;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// One recovery path with its own buffers
struct Plan {
    pair: RebuildPair,
    base: RecoveryBase,
}

/// Read → recover → write pipeline with an ordered failover chain
///
/// Performs no stripe locking; callers provide exclusion.
pub struct NToMRebuild {
    owner: String,
    size: PartitionPhysicalSize,
    buf_cnt: usize,
    resources: RebuildResources,

    /// `plans[0]` is the primary path, the rest are backups in order
    plans: Vec<Plan>,

    cursor: Arc<FailoverCursor>,

    /// Identity used by the phase trace events
    key: u64,
}

impl NToMRebuild {
    pub fn new(
        owner: impl Into<String>,
        primary: RebuildPair,
        size: PartitionPhysicalSize,
        buf_cnt: usize,
        resources: RebuildResources,
        cursor: Arc<FailoverCursor>,
    ) -> Self {
        let owner = owner.into();
        let key = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "NToMRebuild {} ({}): src {}, dst {}",
            owner,
            key,
            primary.srcs.len(),
            primary.dsts.len()
        );

        let mut this = Self {
            owner,
            size,
            buf_cnt,
            resources,
            plans: Vec::new(),
            cursor,
            key,
        };
        let plan = this.plan(primary);
        this.plans.push(plan);
        this
    }

    /// Append a backup path, used after read failures of the previous one
    pub fn with_backup(mut self, backup: RebuildPair) -> Self {
        let plan = self.plan(backup);
        self.plans.push(plan);
        self
    }

    fn plan(&self, pair: RebuildPair) -> Plan {
        let chunk = self.size.chunk_bytes() as usize;
        let base = RecoveryBase::new(
            chunk * pair.srcs.len(),
            chunk * pair.dsts.len(),
            self.buf_cnt,
            Arc::clone(&self.resources.pool_factory),
            self.resources.config.numa_hint,
        );
        Plan { pair, base }
    }

    /// Allocate the buffers of the plan in use; backups stay unallocated
    /// until a failover needs them
    pub fn init(&self) -> bool {
        self.init_plan(self.cursor.current())
    }

    fn init_plan(&self, index: usize) -> bool {
        match self.plans.get(index) {
            Some(plan) => plan.base.init(&format!("{}_{}", self.owner, index)),
            None => false,
        }
    }

    pub fn is_failed_over(&self) -> bool {
        self.cursor.is_failed_over()
    }

    /// Index of the plan new stripes are sent to
    pub fn active_plan(&self) -> usize {
        self.cursor.current()
    }

    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }

    /// Buffer pools of plan `index` as (source, destination)
    pub fn pools(&self, index: usize) -> Option<(Arc<BufferPool>, Arc<BufferPool>)> {
        let base = &self.plans.get(index)?.base;
        Some((base.src_buffer()?, base.dest_buffer()?))
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    /// Rebuild `stripe_id`; `callback` runs exactly once with the result
    pub fn recover(self: &Arc<Self>, array_index: u32, stripe_id: StripeId, callback: StripeDone) {
        let index = self.cursor.current();
        tracing::debug!(
            "NToMRebuild {}: recover array {} stripe {} on plan {}",
            self.owner,
            array_index,
            stripe_id,
            index
        );
        self.read(index, array_index, stripe_id, callback);
    }

    fn read(self: &Arc<Self>, index: usize, array_index: u32, stripe_id: StripeId, callback: StripeDone) {
        let Some((src_pool, _)) = self.pools(index) else {
            tracing::error!(
                "NToMRebuild {}: plan {} used before its buffers were allocated",
                self.owner,
                index
            );
            callback(IoStatus::BUFFER_EXHAUSTED);
            return;
        };
        let plan = &self.plans[index];

        let buffer = take_buffer(&src_pool);
        let targets = self.targets(&plan.pair.srcs, stripe_id);
        let unit = self.size.chunk_bytes() as usize;

        tracing::trace!(key = self.key, stripe_id, "read begin");
        let this = Arc::clone(self);
        submit_split(
            self.resources.submitter.as_ref(),
            IoDirection::Read,
            buffer,
            &targets,
            unit,
            array_index,
            Box::new(move |src, status| {
                this.read_done(index, array_index, stripe_id, callback, src, status)
            }),
        );
    }

    fn read_done(
        self: &Arc<Self>,
        index: usize,
        array_index: u32,
        stripe_id: StripeId,
        callback: StripeDone,
        src: BytesMut,
        status: IoStatus,
    ) {
        tracing::trace!(key = self.key, stripe_id, status = status.code(), "read end");
        let Some((src_pool, dst_pool)) = self.pools(index) else {
            callback(IoStatus::BUFFER_EXHAUSTED);
            return;
        };

        if !status.is_success() {
            src_pool.return_buffer(src);
            self.fail_over(index, array_index, stripe_id, callback, status);
            return;
        }

        let plan = &self.plans[index];
        let mut dst = take_buffer(&dst_pool);
        let size = plan.base.dst_slot();

        tracing::trace!(key = self.key, stripe_id, "recover begin");
        (plan.pair.recover_func)(&mut dst[..], &src[..], size);
        tracing::trace!(key = self.key, stripe_id, "recover end");
        src_pool.return_buffer(src);

        self.write(index, array_index, stripe_id, callback, dst);
    }

    /// Move this stripe to the next plan after a read failure, or report it
    fn fail_over(
        self: &Arc<Self>,
        index: usize,
        array_index: u32,
        stripe_id: StripeId,
        callback: StripeDone,
        status: IoStatus,
    ) {
        let next = index + 1;
        if next >= self.plans.len() {
            tracing::warn!(
                "NToMRebuild {}: read of stripe {} failed with {}, no backup left",
                self.owner,
                stripe_id,
                status
            );
            callback(status);
            return;
        }

        if !self.init_plan(next) {
            tracing::warn!(
                "NToMRebuild {}: backup plan {} has no buffers, stripe {} failed",
                self.owner,
                next,
                stripe_id
            );
            callback(status);
            return;
        }

        if self.cursor.advance_to(next) == next {
            tracing::warn!(
                "NToMRebuild {}: read of stripe {} failed with {}, failing over to plan {}",
                self.owner,
                stripe_id,
                status,
                next
            );
        }
        self.read(next, array_index, stripe_id, callback);
    }

    fn write(
        self: &Arc<Self>,
        index: usize,
        array_index: u32,
        stripe_id: StripeId,
        callback: StripeDone,
        dst: BytesMut,
    ) {
        let plan = &self.plans[index];
        let targets = self.targets(&plan.pair.dsts, stripe_id);
        let unit = self.size.chunk_bytes() as usize;

        tracing::trace!(key = self.key, stripe_id, "write begin");
        let this = Arc::clone(self);
        submit_split(
            self.resources.submitter.as_ref(),
            IoDirection::Write,
            dst,
            &targets,
            unit,
            array_index,
            Box::new(move |dst, status| this.write_done(index, stripe_id, callback, dst, status)),
        );
    }

    fn write_done(&self, index: usize, stripe_id: StripeId, callback: StripeDone, dst: BytesMut, status: IoStatus) {
        tracing::trace!(key = self.key, stripe_id, status = status.code(), "write end");
        if let Some((_, dst_pool)) = self.pools(index) {
            dst_pool.return_buffer(dst);
        }
        if !status.is_success() {
            tracing::warn!(
                "NToMRebuild {}: write of stripe {} failed with {}",
                self.owner,
                stripe_id,
                status
            );
        }
        callback(status);
    }

    fn targets(&self, devices: &[DeviceId], stripe_id: StripeId) -> Vec<PhysicalBlkAddr> {
        let lba = self.size.stripe_lba(stripe_id);
        devices
            .iter()
            .map(|device| PhysicalBlkAddr { device: *device, lba })
            .collect()
    }
}
