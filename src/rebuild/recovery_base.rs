//! Recovery Base
//!
//! Source and destination buffer pools of one rebuild method.

use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::buffer::{BufferPool, BufferPoolFactory};

struct Pools {
    src: Arc<BufferPool>,
    dst: Arc<BufferPool>,
}

/// Buffer pools sized for `buf_cnt` stripes in flight
///
/// Pools are created by `init`, which may fail and be retried. Dropping the
/// base while buffers are still out is reported as a leak.
pub struct RecoveryBase {
    src_slot: usize,
    dst_slot: usize,
    buf_cnt: usize,
    numa: u32,
    factory: Arc<dyn BufferPoolFactory>,
    pools: Mutex<Option<Pools>>,
}

impl RecoveryBase {
    pub fn new(
        src_slot: usize,
        dst_slot: usize,
        buf_cnt: usize,
        factory: Arc<dyn BufferPoolFactory>,
        numa: u32,
    ) -> Self {
        Self {
            src_slot,
            dst_slot,
            buf_cnt,
            numa,
            factory,
            pools: Mutex::new(None),
        }
    }

    /// Create both pools; no-op once they exist
    ///
    /// Returns false when either pool cannot be allocated; nothing is kept
    /// in that case, so the call can simply be repeated.
    pub fn init(&self, owner: &str) -> bool {
        let mut pools = self.pools.lock();
        if pools.is_some() {
            return true;
        }

        let src_owner = format!("{}_SrcBuffer", owner);
        let Some(src) =
            self.factory
                .create_buffer_pool(&src_owner, self.src_slot, self.buf_cnt, self.numa)
        else {
            tracing::debug!("Source pool of {} not available yet", owner);
            return false;
        };

        let dst_owner = format!("{}_DstBuffer", owner);
        let Some(dst) =
            self.factory
                .create_buffer_pool(&dst_owner, self.dst_slot, self.buf_cnt, self.numa)
        else {
            tracing::debug!("Destination pool of {} not available yet", owner);
            return false;
        };

        tracing::debug!(
            "{} buffers ready: {} x ({} + {}) bytes",
            owner,
            self.buf_cnt,
            self.src_slot,
            self.dst_slot
        );
        *pools = Some(Pools { src, dst });
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.pools.lock().is_some()
    }

    pub fn src_buffer(&self) -> Option<Arc<BufferPool>> {
        self.pools.lock().as_ref().map(|p| Arc::clone(&p.src))
    }

    /// Destination pool, shared with the degraded read path
    pub fn dest_buffer(&self) -> Option<Arc<BufferPool>> {
        self.pools.lock().as_ref().map(|p| Arc::clone(&p.dst))
    }

    pub fn src_slot(&self) -> usize {
        self.src_slot
    }

    pub fn dst_slot(&self) -> usize {
        self.dst_slot
    }
}

impl Drop for RecoveryBase {
    fn drop(&mut self) {
        if let Some(pools) = self.pools.get_mut().as_ref() {
            for pool in [&pools.src, &pools.dst] {
                if !pool.is_full() {
                    tracing::error!(
                        "Buffer leak in {}: {} of {} slots not returned",
                        pool.owner(),
                        pool.slot_count() - pool.available(),
                        pool.slot_count()
                    );
                }
            }
        }
    }
}

/// Take a slot from a pool the pipeline sized for its own concurrency
///
/// An empty pool here means the in-flight budget was broken; it is treated
/// as fatal.
pub(crate) fn take_buffer(pool: &BufferPool) -> BytesMut {
    match pool.try_get_buffer() {
        Some(buffer) => buffer,
        None => {
            tracing::warn!("Failed to get buffer, {} pool is empty", pool.owner());
            panic!("buffer pool {} exhausted inside the rebuild pipeline", pool.owner());
        }
    }
}
