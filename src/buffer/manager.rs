//! Memory Manager
//!
//! Creates buffer pools, optionally against a fixed byte budget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::BufferPool;

/// Creates buffer pools for rebuild components
pub trait BufferPoolFactory: Send + Sync {
    /// Returns None when the memory for the pool cannot be reserved
    fn create_buffer_pool(
        &self,
        owner: &str,
        slot_size: usize,
        slot_count: usize,
        numa: u32,
    ) -> Option<Arc<BufferPool>>;
}

/// Default pool factory
///
/// With a budget, pool creation fails once the budget is spent, and dropping
/// a pool gives its bytes back.
#[derive(Debug, Default)]
pub struct MemoryManager {
    /// Remaining bytes (None = unlimited)
    budget: Option<Arc<AtomicU64>>,
}

impl MemoryManager {
    /// Unlimited memory
    pub fn new() -> Self {
        Self { budget: None }
    }

    /// Memory limited to `bytes` across all live pools
    pub fn with_budget(bytes: u64) -> Self {
        Self {
            budget: Some(Arc::new(AtomicU64::new(bytes))),
        }
    }

    /// Bytes still available (None when unlimited)
    pub fn remaining(&self) -> Option<u64> {
        self.budget.as_ref().map(|b| b.load(Ordering::SeqCst))
    }

    /// Add bytes to the budget (no-op when unlimited)
    pub fn grow(&self, bytes: u64) {
        if let Some(budget) = &self.budget {
            budget.fetch_add(bytes, Ordering::SeqCst);
        }
    }

    fn reserve(budget: &AtomicU64, bytes: u64) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(bytes))
            .is_ok()
    }
}

impl BufferPoolFactory for MemoryManager {
    fn create_buffer_pool(
        &self,
        owner: &str,
        slot_size: usize,
        slot_count: usize,
        numa: u32,
    ) -> Option<Arc<BufferPool>> {
        let bytes = (slot_size * slot_count) as u64;

        if let Some(budget) = &self.budget {
            if !Self::reserve(budget, bytes) {
                tracing::debug!(
                    "Cannot create pool {} ({} x {} bytes, numa {}): budget exhausted",
                    owner,
                    slot_count,
                    slot_size,
                    numa
                );
                return None;
            }
        }

        tracing::trace!(
            "Created pool {} ({} x {} bytes, numa {})",
            owner,
            slot_count,
            slot_size,
            numa
        );
        Some(Arc::new(BufferPool::with_budget(
            owner,
            slot_size,
            slot_count,
            self.budget.clone(),
        )))
    }
}
