//! I/O request descriptor

use std::fmt;

use bytes::BytesMut;

use crate::types::{bytes_to_sectors, PhysicalBlkAddr};

/// Completion status of an asynchronous operation; zero means success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoStatus(i32);

impl IoStatus {
    pub const SUCCESS: IoStatus = IoStatus(0);
    pub const GENERIC_ERROR: IoStatus = IoStatus(1);
    pub const DEVICE_ERROR: IoStatus = IoStatus(2);
    pub const NO_RECOVER_METHOD: IoStatus = IoStatus(3);
    pub const BUFFER_EXHAUSTED: IoStatus = IoStatus(4);

    pub fn from_code(code: i32) -> Self {
        IoStatus(code)
    }

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Keep the first failure
    pub fn or(self, other: IoStatus) -> IoStatus {
        if self.is_success() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for IoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    Read,
    Write,
}

/// Called once with the completed request and its status
pub type IoCallback = Box<dyn FnOnce(IoRequest, IoStatus) + Send>;

/// One device request
///
/// The buffer length defines the transfer size; it must be a multiple of
/// the sector size.
pub struct IoRequest {
    pub dir: IoDirection,
    pub addr: PhysicalBlkAddr,
    pub buffer: BytesMut,
    pub array_index: u32,

    /// Set once a degraded-read recovery was attempted for this request
    retry: bool,

    callback: Option<IoCallback>,
}

impl IoRequest {
    pub fn new(dir: IoDirection, addr: PhysicalBlkAddr, buffer: BytesMut, array_index: u32) -> Self {
        Self {
            dir,
            addr,
            buffer,
            array_index,
            retry: false,
            callback: None,
        }
    }

    /// Attach the completion callback (builder style)
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(IoRequest, IoStatus) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Replace the completion callback
    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnOnce(IoRequest, IoStatus) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn sector_count(&self) -> u64 {
        bytes_to_sectors(self.buffer.len() as u64)
    }

    pub fn is_retry(&self) -> bool {
        self.retry
    }

    pub fn set_retry(&mut self, retry: bool) {
        self.retry = retry;
    }

    /// Deliver completion; a request without a callback is simply dropped
    pub fn complete(mut self, status: IoStatus) {
        if let Some(callback) = self.callback.take() {
            callback(self, status);
        }
    }
}

impl fmt::Debug for IoRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoRequest")
            .field("dir", &self.dir)
            .field("addr", &self.addr)
            .field("len", &self.buffer.len())
            .field("array_index", &self.array_index)
            .field("retry", &self.retry)
            .finish()
    }
}
