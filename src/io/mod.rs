//! I/O Module
//!
//! Asynchronous block I/O descriptors and the submission boundary.
//!
//! ## Responsibilities
//! - Describe one device request (`IoRequest`) and its completion callback
//! - Carry integer completion status (`IoStatus`) across async boundaries
//! - Split one coalesced buffer into per-device sub-requests and aggregate
//!   their completions (`submit_split`)
//! - Provide an in-memory device array for tests and simulation
//!
//! ## Request Lifecycle
//! ```text
//!   IoRequest::new ──► IoSubmitter::submit ──► (device work) ──► complete(status)
//!                                                                   │
//!                                            callback(request, status)
//! ```
//! The request (and its buffer) is handed back to the callback, so buffers
//! travel with the request and never need to be shared.

mod request;
mod split;
mod memory;

pub use request::{IoCallback, IoDirection, IoRequest, IoStatus};
pub use split::{submit_split, SplitDone};
pub use memory::{CompletionMode, FaultRule, MemoryArray};

/// Fire-and-forget submission of device requests
///
/// Completion is delivered later by calling [`IoRequest::complete`], possibly
/// on another thread and possibly before `submit` returns.
pub trait IoSubmitter: Send + Sync {
    fn submit(&self, io: IoRequest);
}
