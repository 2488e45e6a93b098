//! Degraded read
//!
//! Serves one request aimed at an unavailable device by reading its
//! recovery group and running the recovery function over the result.

use std::sync::Arc;

use bytes::BytesMut;

use super::IoRecover;
use crate::buffer::BufferPool;
use crate::error::RebuildError;
use crate::io::{submit_split, IoDirection, IoRequest, IoStatus, IoSubmitter};
use crate::types::{PhysicalBlkAddr, SECTORS_PER_BLOCK, SECTOR_SIZE};

/// A request `RebuildRead` refused, handed back untouched apart from the
/// retry mark
#[derive(Debug)]
pub struct RejectedRequest {
    pub error: RebuildError,
    pub request: IoRequest,
}

/// Where the working memory of one recovery came from
enum WorkMemory {
    Pool(Arc<BufferPool>),
    Heap,
}

impl WorkMemory {
    fn release(&self, buffer: BytesMut) {
        if let WorkMemory::Pool(pool) = self {
            pool.return_buffer(buffer);
        }
    }
}

/// Block-aligned window covering a request
#[derive(Debug, Clone, Copy)]
struct ReadWindow {
    /// Sectors between the aligned start and the request start
    head_sectors: u64,
    /// Bytes read from each source
    bytes: usize,
}

impl ReadWindow {
    fn cover(lba: u64, sectors: u64) -> Self {
        let head_sectors = lba % SECTORS_PER_BLOCK;
        let span = head_sectors + sectors;
        let aligned = span.div_ceil(SECTORS_PER_BLOCK) * SECTORS_PER_BLOCK;
        Self {
            head_sectors,
            bytes: (aligned * SECTOR_SIZE) as usize,
        }
    }

    fn head_bytes(&self) -> usize {
        (self.head_sectors * SECTOR_SIZE) as usize
    }
}

/// On-demand reconstruction of one read
pub struct RebuildRead {
    io_recover: Arc<IoRecover>,
    submitter: Arc<dyn IoSubmitter>,
}

impl RebuildRead {
    pub fn new(io_recover: Arc<IoRecover>, submitter: Arc<dyn IoSubmitter>) -> Self {
        Self {
            io_recover,
            submitter,
        }
    }

    /// Reconstruct the data `request` asks for and complete it
    ///
    /// `pool` supplies working memory during a bulk rebuild; a single
    /// degraded read passes None and gets plain memory. On Err the request
    /// was neither submitted nor completed and is returned to the caller.
    pub fn recover(
        &self,
        mut request: IoRequest,
        pool: Option<&Arc<BufferPool>>,
    ) -> std::result::Result<(), RejectedRequest> {
        if request.buffer.len() as u64 % SECTOR_SIZE != 0 {
            let error = RebuildError::InvalidGeometry(format!(
                "read of {} bytes is not sector aligned",
                request.buffer.len()
            ));
            return Err(RejectedRequest { error, request });
        }
        if request.is_retry() {
            return Err(RejectedRequest {
                error: RebuildError::RetryInProgress,
                request,
            });
        }
        request.set_retry(true);

        let method = match self.io_recover.get_recover_method(request.array_index, &request) {
            Ok(method) if !method.src_addrs.is_empty() => method,
            Ok(_) => {
                let error = RebuildError::NoRecoverMethod {
                    array_index: request.array_index,
                    lba: request.addr.lba,
                };
                return Err(RejectedRequest { error, request });
            }
            Err(error) => return Err(RejectedRequest { error, request }),
        };

        let window = ReadWindow::cover(request.addr.lba, request.sector_count());
        let total = window.bytes * method.src_addrs.len();

        let (mut work, memory) = match pool {
            Some(pool) if pool.slot_size() >= total => match pool.try_get_buffer() {
                Some(buffer) => (buffer, WorkMemory::Pool(Arc::clone(pool))),
                None => {
                    tracing::warn!("RebuildRead: pool {} has no free buffer", pool.owner());
                    let error = RebuildError::BufferExhausted {
                        owner: pool.owner().to_string(),
                    };
                    return Err(RejectedRequest { error, request });
                }
            },
            Some(pool) => {
                tracing::debug!(
                    "RebuildRead: {} bytes exceed slot size of pool {}",
                    total,
                    pool.owner()
                );
                (BytesMut::zeroed(total), WorkMemory::Heap)
            }
            None => (BytesMut::zeroed(total), WorkMemory::Heap),
        };
        work.truncate(total);

        let targets: Vec<PhysicalBlkAddr> = method
            .src_addrs
            .iter()
            .map(|src| PhysicalBlkAddr {
                device: src.device,
                lba: src.lba.saturating_sub(window.head_sectors),
            })
            .collect();

        tracing::trace!(
            "RebuildRead: array {} {} lba {} from {} sources",
            request.array_index,
            request.addr.device,
            request.addr.lba,
            targets.len()
        );

        let recover_func = method.recover_func;
        let array_index = request.array_index;
        submit_split(
            self.submitter.as_ref(),
            IoDirection::Read,
            work,
            &targets,
            window.bytes,
            array_index,
            Box::new(move |work, status| {
                let mut request = request;
                if status.is_success() {
                    let len = request.buffer.len();
                    if window.head_sectors == 0 && len == window.bytes {
                        recover_func(&mut request.buffer[..], &work[..], window.bytes);
                    } else {
                        let mut scratch = vec![0u8; window.bytes];
                        recover_func(&mut scratch, &work[..], window.bytes);
                        let head = window.head_bytes();
                        request.buffer.copy_from_slice(&scratch[head..head + len]);
                    }
                } else {
                    tracing::warn!(
                        "RebuildRead: source read failed for lba {}, status {}",
                        request.addr.lba,
                        status
                    );
                }
                memory.release(work);
                request.complete(status);
            }),
        );
        Ok(())
    }
}

/// Status handed to a request whose recovery was refused
pub(crate) fn rejection_status(error: &RebuildError) -> IoStatus {
    match error {
        RebuildError::BufferExhausted { .. } => IoStatus::BUFFER_EXHAUSTED,
        RebuildError::NoRecoverMethod { .. } => IoStatus::NO_RECOVER_METHOD,
        _ => IoStatus::GENERIC_ERROR,
    }
}
