//! Split submission
//!
//! One coalesced buffer is carved into equal units, one per target device,
//! and the completions are folded back into the original buffer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

use super::{IoDirection, IoRequest, IoStatus, IoSubmitter};
use crate::types::PhysicalBlkAddr;

/// Receives the reassembled buffer and the first failure (if any)
pub type SplitDone = Box<dyn FnOnce(BytesMut, IoStatus) + Send>;

/// Tracks the outstanding sub-requests of one split
struct SplitCompletion {
    /// Sub-requests not yet completed
    waiting: AtomicUsize,

    /// Parts by index, refilled as sub-requests complete
    parts: Mutex<Vec<Option<BytesMut>>>,

    /// Bytes past the last unit, reattached at the end
    tail: Mutex<Option<BytesMut>>,

    status: Mutex<IoStatus>,

    on_done: Mutex<Option<SplitDone>>,
}

impl SplitCompletion {
    fn part_done(&self, index: usize, buffer: BytesMut, status: IoStatus) {
        if !status.is_success() {
            let mut merged = self.status.lock();
            *merged = merged.or(status);
        }
        self.parts.lock()[index] = Some(buffer);

        // Last one out reassembles and reports
        if self.waiting.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        let mut whole = BytesMut::new();
        for part in self.parts.lock().drain(..).flatten() {
            if whole.is_empty() {
                whole = part;
            } else {
                whole.unsplit(part);
            }
        }
        if let Some(tail) = self.tail.lock().take() {
            whole.unsplit(tail);
        }

        let status = *self.status.lock();
        if let Some(on_done) = self.on_done.lock().take() {
            on_done(whole, status);
        }
    }
}

/// Split `buffer` into `unit`-byte pieces, one per target, and submit them
///
/// `on_done` runs exactly once, after every piece completed, with the buffer
/// restored to its original extent. With no targets it runs immediately.
pub fn submit_split(
    submitter: &dyn IoSubmitter,
    dir: IoDirection,
    buffer: BytesMut,
    targets: &[PhysicalBlkAddr],
    unit: usize,
    array_index: u32,
    on_done: SplitDone,
) {
    if targets.is_empty() {
        on_done(buffer, IoStatus::SUCCESS);
        return;
    }
    assert!(
        unit * targets.len() <= buffer.len(),
        "split of {} bytes into {} x {} bytes",
        buffer.len(),
        targets.len(),
        unit
    );

    let completion = Arc::new(SplitCompletion {
        waiting: AtomicUsize::new(targets.len()),
        parts: Mutex::new((0..targets.len()).map(|_| None).collect()),
        tail: Mutex::new(None),
        status: Mutex::new(IoStatus::SUCCESS),
        on_done: Mutex::new(Some(on_done)),
    });

    let mut rest = buffer;
    let mut requests = Vec::with_capacity(targets.len());
    for (index, addr) in targets.iter().enumerate() {
        let part = rest.split_to(unit);
        let completion = Arc::clone(&completion);
        let request = IoRequest::new(dir, *addr, part, array_index).with_callback(
            move |io, status| completion.part_done(index, io.buffer, status),
        );
        requests.push(request);
    }
    // Kept even when empty: it still owns the spare capacity of the buffer
    *completion.tail.lock() = Some(rest);

    // Waiting count is set before the first submission
    for request in requests {
        submitter.submit(request);
    }
}
