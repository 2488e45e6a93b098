//! Buffer Module
//!
//! Fixed-size slot pools that bound how many stripes may be in flight.
//!
//! ## Responsibilities
//! - Hand out equally sized `BytesMut` slots without blocking
//! - Accept slots back from any completion thread
//! - Report "full" once every slot has been returned
//! - Refund the owning memory budget when a pool is dropped

mod pool;
mod manager;

pub use pool::BufferPool;
pub use manager::{BufferPoolFactory, MemoryManager};
