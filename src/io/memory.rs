//! In-memory device array
//!
//! RAM-backed member devices with fault injection. Requests move data at
//! submission; completion is delivered inline or parked until
//! [`MemoryArray::complete_pending`] is called.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use super::{IoDirection, IoRequest, IoStatus, IoSubmitter};
use crate::types::{DeviceId, SECTOR_SIZE};

/// When completions are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Inside `submit`, on the submitting thread
    Immediate,
    /// On the thread calling `complete_pending`
    Deferred,
}

/// How an injected fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultRule {
    Always,
    Times(u32),
}

#[derive(Default)]
struct FaultTable {
    reads: HashMap<DeviceId, FaultRule>,
    writes: HashMap<DeviceId, FaultRule>,
}

impl FaultTable {
    /// Consume one firing of the rule for `device`, if any
    fn fire(rules: &mut HashMap<DeviceId, FaultRule>, device: DeviceId) -> bool {
        let (fires, exhausted) = match rules.get_mut(&device) {
            Some(FaultRule::Always) => (true, false),
            Some(FaultRule::Times(left)) => {
                let fires = *left > 0;
                *left = left.saturating_sub(1);
                (fires, *left == 0)
            }
            None => (false, false),
        };
        if exhausted {
            rules.remove(&device);
        }
        fires
    }
}

/// RAM-backed array of member devices
pub struct MemoryArray {
    mode: CompletionMode,

    /// Device contents, one byte vector per device
    devices: RwLock<HashMap<DeviceId, Mutex<Vec<u8>>>>,

    faults: Mutex<FaultTable>,

    /// Completions parked in deferred mode
    pending: Mutex<VecDeque<(IoRequest, IoStatus)>>,

    reads_submitted: AtomicU64,
    writes_submitted: AtomicU64,
}

impl MemoryArray {
    pub fn new(mode: CompletionMode) -> Self {
        Self {
            mode,
            devices: RwLock::new(HashMap::new()),
            faults: Mutex::new(FaultTable::default()),
            pending: Mutex::new(VecDeque::new()),
            reads_submitted: AtomicU64::new(0),
            writes_submitted: AtomicU64::new(0),
        }
    }

    /// Add a zero-filled device of `sectors` sectors
    pub fn add_device(&self, device: DeviceId, sectors: u64) {
        let bytes = (sectors * SECTOR_SIZE) as usize;
        self.devices.write().insert(device, Mutex::new(vec![0u8; bytes]));
    }

    // =========================================================================
    // Direct Access (setup and verification)
    // =========================================================================

    /// Write bytes without going through the request path
    pub fn write_at(&self, device: DeviceId, lba: u64, data: &[u8]) -> bool {
        let devices = self.devices.read();
        let Some(dev) = devices.get(&device) else {
            return false;
        };
        let mut dev = dev.lock();
        let start = (lba * SECTOR_SIZE) as usize;
        let Some(slot) = dev.get_mut(start..start + data.len()) else {
            return false;
        };
        slot.copy_from_slice(data);
        true
    }

    /// Read bytes without going through the request path
    pub fn read_at(&self, device: DeviceId, lba: u64, len: usize) -> Option<Vec<u8>> {
        let devices = self.devices.read();
        let dev = devices.get(&device)?.lock();
        let start = (lba * SECTOR_SIZE) as usize;
        dev.get(start..start + len).map(|s| s.to_vec())
    }

    // =========================================================================
    // Fault Injection
    // =========================================================================

    pub fn inject_read_error(&self, device: DeviceId, rule: FaultRule) {
        self.faults.lock().reads.insert(device, rule);
    }

    pub fn inject_write_error(&self, device: DeviceId, rule: FaultRule) {
        self.faults.lock().writes.insert(device, rule);
    }

    pub fn clear_faults(&self) {
        let mut faults = self.faults.lock();
        faults.reads.clear();
        faults.writes.clear();
    }

    // =========================================================================
    // Completion Control
    // =========================================================================

    /// Deliver every parked completion, including ones queued by callbacks
    /// that run during this call. Returns how many were delivered.
    pub fn complete_pending(&self) -> usize {
        let mut delivered = 0;
        loop {
            // Lock released before the callback runs
            let next = self.pending.lock().pop_front();
            match next {
                Some((io, status)) => {
                    io.complete(status);
                    delivered += 1;
                }
                None => return delivered,
            }
        }
    }

    /// Deliver at most one parked completion
    pub fn complete_one(&self) -> bool {
        let next = self.pending.lock().pop_front();
        match next {
            Some((io, status)) => {
                io.complete(status);
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn reads_submitted(&self) -> u64 {
        self.reads_submitted.load(Ordering::SeqCst)
    }

    pub fn writes_submitted(&self) -> u64 {
        self.writes_submitted.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn execute(&self, io: &mut IoRequest) -> IoStatus {
        let device = io.addr.device;
        let injected = {
            let mut faults = self.faults.lock();
            match io.dir {
                IoDirection::Read => FaultTable::fire(&mut faults.reads, device),
                IoDirection::Write => FaultTable::fire(&mut faults.writes, device),
            }
        };
        if injected {
            tracing::debug!("Injected {:?} error on {} lba {}", io.dir, device, io.addr.lba);
            return IoStatus::DEVICE_ERROR;
        }

        let devices = self.devices.read();
        let Some(dev) = devices.get(&device) else {
            return IoStatus::DEVICE_ERROR;
        };
        let mut dev = dev.lock();
        let start = (io.addr.lba * SECTOR_SIZE) as usize;
        let end = start + io.buffer.len();
        let Some(region) = dev.get_mut(start..end) else {
            tracing::warn!("Request beyond end of {}: lba {}", device, io.addr.lba);
            return IoStatus::DEVICE_ERROR;
        };

        match io.dir {
            IoDirection::Read => io.buffer.copy_from_slice(region),
            IoDirection::Write => region.copy_from_slice(&io.buffer),
        }
        IoStatus::SUCCESS
    }
}

impl IoSubmitter for MemoryArray {
    fn submit(&self, mut io: IoRequest) {
        match io.dir {
            IoDirection::Read => self.reads_submitted.fetch_add(1, Ordering::SeqCst),
            IoDirection::Write => self.writes_submitted.fetch_add(1, Ordering::SeqCst),
        };

        let status = self.execute(&mut io);

        match self.mode {
            CompletionMode::Immediate => io.complete(status),
            CompletionMode::Deferred => self.pending.lock().push_back((io, status)),
        }
    }
}
