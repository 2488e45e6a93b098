//! Rebuild Context
//!
//! Per-job state shared by a behavior, its pipelines and their completions.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{RebuildLogger, RebuildProgress};
use crate::error::Result;
use crate::recover::{AddressTranslator, RecoverFunc};
use crate::types::{
    DeviceId, FtBlkAddr, PartitionPhysicalSize, PartitionType, PhysicalBlkAddr, RaidType,
    RebuildKind, RebuildState,
};

/// One recovery path: read `srcs`, run `recover_func`, write `dsts`
#[derive(Clone)]
pub struct RebuildPair {
    pub srcs: Vec<DeviceId>,
    pub dsts: Vec<DeviceId>,
    pub recover_func: RecoverFunc,
}

impl RebuildPair {
    pub fn new(srcs: Vec<DeviceId>, dsts: Vec<DeviceId>, recover_func: RecoverFunc) -> Self {
        Self {
            srcs,
            dsts,
            recover_func,
        }
    }
}

impl fmt::Debug for RebuildPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RebuildPair")
            .field("srcs", &self.srcs)
            .field("dsts", &self.dsts)
            .finish()
    }
}

/// Index of the recovery plan currently in use; only moves forward
#[derive(Debug, Default)]
pub struct FailoverCursor {
    position: AtomicUsize,
}

impl FailoverCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    /// Move to `index` unless the cursor is already past it; returns the
    /// resulting position
    pub fn advance_to(&self, index: usize) -> usize {
        let previous = self.position.fetch_max(index, Ordering::AcqRel);
        previous.max(index)
    }

    pub fn is_failed_over(&self) -> bool {
        self.current() > 0
    }
}

/// Outcome delivered when a rebuild job ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildResult {
    pub array_name: String,
    /// None for the array-level result
    pub part: Option<PartitionType>,
    pub result: RebuildState,
}

/// Invoked once when a job completes
pub type RebuildCompleteHandler = Box<dyn FnOnce(RebuildResult) + Send>;

/// State of one partition rebuild job
///
/// ## Concurrency:
/// - Descriptors are fixed once the context is handed to a behavior
/// - `task_cnt`, `result` and `completed` are atomics touched from
///   completion threads
pub struct RebuildContext {
    pub array_name: String,
    pub array_index: u32,
    pub part: PartitionType,
    pub raid_type: RaidType,
    pub kind: RebuildKind,
    pub size: PartitionPhysicalSize,

    /// Chunk index of the faulty device inside a stripe
    pub fault_idx: u32,

    /// Primary recovery paths, one pipeline each
    pub pairs: Vec<RebuildPair>,

    /// Backup path of `pairs[i]` at index i (may be shorter than `pairs`)
    pub backup_pairs: Vec<RebuildPair>,

    pub translator: Option<AddressTranslator>,
    pub progress: Arc<RebuildProgress>,
    pub logger: Option<Arc<RebuildLogger>>,

    /// Failover cursor of each pipeline, created on first use
    cursors: Mutex<Vec<Arc<FailoverCursor>>>,

    /// Outstanding stripe tasks of the current batch
    task_cnt: AtomicU32,

    result: AtomicU8,
    completed: AtomicBool,
    complete_handler: Mutex<Option<RebuildCompleteHandler>>,
}

impl RebuildContext {
    pub fn new(part: PartitionType, raid_type: RaidType, size: PartitionPhysicalSize) -> Result<Self> {
        size.validate()?;

        let progress = RebuildProgress::new(part.as_str());
        progress.set_total(size.total_stripes() as u64);

        Ok(Self {
            array_name: String::new(),
            array_index: 0,
            part,
            raid_type,
            kind: RebuildKind::Full,
            size,
            fault_idx: 0,
            pairs: Vec::new(),
            backup_pairs: Vec::new(),
            translator: None,
            progress: Arc::new(progress),
            logger: None,
            cursors: Mutex::new(Vec::new()),
            task_cnt: AtomicU32::new(0),
            result: AtomicU8::new(RebuildState::Ready as u8),
            completed: AtomicBool::new(false),
            complete_handler: Mutex::new(None),
        })
    }

    pub fn with_array(mut self, name: impl Into<String>, index: u32) -> Self {
        self.array_name = name.into();
        self.array_index = index;
        self
    }

    pub fn with_kind(mut self, kind: RebuildKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_fault_idx(mut self, fault_idx: u32) -> Self {
        self.fault_idx = fault_idx;
        self
    }

    pub fn with_pair(mut self, pair: RebuildPair) -> Self {
        self.pairs.push(pair);
        self
    }

    pub fn with_backup_pair(mut self, pair: RebuildPair) -> Self {
        self.backup_pairs.push(pair);
        self
    }

    pub fn with_translator(mut self, translator: AddressTranslator) -> Self {
        self.translator = Some(translator);
        self
    }

    // =========================================================================
    // Result
    // =========================================================================

    pub fn result(&self) -> RebuildState {
        RebuildState::from_u8(self.result.load(Ordering::Acquire))
    }

    /// Raise the result to `state`; a lower state never replaces a higher
    /// one. Returns the state that was current before the call.
    pub fn set_result(&self, state: RebuildState) -> RebuildState {
        RebuildState::from_u8(self.result.fetch_max(state as u8, Ordering::AcqRel))
    }

    /// Move a job that has not ended yet to CANCELLED; true if this call did
    pub fn cancel(&self) -> bool {
        self.result
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                let state = RebuildState::from_u8(raw);
                (!state.is_terminal()).then_some(RebuildState::Cancelled as u8)
            })
            .is_ok()
    }

    // =========================================================================
    // Task Counter
    // =========================================================================

    pub fn set_task_cnt(&self, count: u32) {
        self.task_cnt.store(count, Ordering::Release);
    }

    pub fn task_cnt(&self) -> u32 {
        self.task_cnt.load(Ordering::Acquire)
    }

    /// Count one task down; true for the completion that reached zero
    pub fn complete_task(&self) -> bool {
        match self
            .task_cnt
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => previous == 1,
            Err(_) => {
                tracing::error!(
                    "Task counter of {} already zero, completion ignored",
                    self.part
                );
                false
            }
        }
    }

    // =========================================================================
    // Completion
    // =========================================================================

    pub fn set_complete_handler(&self, handler: RebuildCompleteHandler) {
        *self.complete_handler.lock() = Some(handler);
    }

    /// Claim the right to emit completion; true only for the first caller
    pub(crate) fn mark_completed(&self) -> bool {
        !self.completed.swap(true, Ordering::AcqRel)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn take_complete_handler(&self) -> Option<RebuildCompleteHandler> {
        self.complete_handler.lock().take()
    }

    pub fn rebuild_result(&self) -> RebuildResult {
        RebuildResult {
            array_name: self.array_name.clone(),
            part: Some(self.part),
            result: self.result(),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Failover cursor of pipeline `index`
    pub fn failover_cursor(&self, index: usize) -> Arc<FailoverCursor> {
        let mut cursors = self.cursors.lock();
        while cursors.len() <= index {
            cursors.push(Arc::new(FailoverCursor::new()));
        }
        Arc::clone(&cursors[index])
    }

    /// Device address of `fta`, if a translator is installed
    pub fn translate(&self, fta: FtBlkAddr) -> Option<PhysicalBlkAddr> {
        self.translator.as_ref().map(|translate| translate(fta))
    }

    pub fn total_stripes(&self) -> u32 {
        self.size.total_stripes()
    }

    /// Report `done` stripes of this partition
    pub fn update_progress(&self, done: u64) {
        self.progress.update(self.part.as_str(), done);
    }
}

impl fmt::Debug for RebuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RebuildContext")
            .field("array_name", &self.array_name)
            .field("part", &self.part)
            .field("raid_type", &self.raid_type)
            .field("size", &self.size)
            .field("pairs", &self.pairs.len())
            .field("result", &self.result())
            .field("task_cnt", &self.task_cnt())
            .finish()
    }
}
