//! Buffer Pool
//!
//! Lock-free pool of equally sized slots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;

/// Pool of `slot_count` buffers of `slot_size` bytes each
///
/// ## Concurrency:
/// - `free`: lock-free bounded queue, safe for acquire/return from any thread
/// - Budget refund happens once, on drop
pub struct BufferPool {
    /// Name used in log lines
    owner: String,

    slot_size: usize,
    slot_count: usize,

    /// Slots currently available
    free: ArrayQueue<BytesMut>,

    /// Memory budget to refund on drop (None when unbudgeted)
    budget: Option<Arc<AtomicU64>>,
}

impl BufferPool {
    /// Create a pool with every slot allocated and free
    pub fn new(owner: impl Into<String>, slot_size: usize, slot_count: usize) -> Self {
        Self::with_budget(owner, slot_size, slot_count, None)
    }

    pub(crate) fn with_budget(
        owner: impl Into<String>,
        slot_size: usize,
        slot_count: usize,
        budget: Option<Arc<AtomicU64>>,
    ) -> Self {
        // ArrayQueue rejects a zero capacity
        let free = ArrayQueue::new(slot_count.max(1));
        for _ in 0..slot_count {
            let _ = free.push(BytesMut::zeroed(slot_size));
        }

        Self {
            owner: owner.into(),
            slot_size,
            slot_count,
            free,
            budget,
        }
    }

    /// Take a slot, or None when every slot is in use
    pub fn try_get_buffer(&self) -> Option<BytesMut> {
        self.free.pop()
    }

    /// Give a slot back
    ///
    /// A buffer whose length no longer matches the slot size is dropped and
    /// logged; the pool will then never report full again.
    pub fn return_buffer(&self, mut buffer: BytesMut) {
        if buffer.len() != self.slot_size {
            if buffer.capacity() >= self.slot_size {
                buffer.resize(self.slot_size, 0);
            } else {
                tracing::error!(
                    "Buffer of {} bytes returned to pool {} (slot size {})",
                    buffer.len(),
                    self.owner,
                    self.slot_size
                );
                return;
            }
        }

        if self.free.push(buffer).is_err() {
            tracing::error!("Pool {} received more buffers than it owns", self.owner);
        }
    }

    /// True when all slots are back in the pool
    pub fn is_full(&self) -> bool {
        self.free.len() == self.slot_count
    }

    /// Number of slots currently available
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if let Some(budget) = &self.budget {
            let bytes = (self.slot_size * self.slot_count) as u64;
            budget.fetch_add(bytes, Ordering::SeqCst);
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("owner", &self.owner)
            .field("slot_size", &self.slot_size)
            .field("slot_count", &self.slot_count)
            .field("available", &self.free.len())
            .finish()
    }
}
