//! Rebuild Log
//!
//! Summary record of each array rebuild, appended to a log file.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ Len (4) │ CRC (4) │ bincode(record) │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2 ...                            │
//! └─────────────────────────────────────────┘
//! ```
//! Length and CRC are little endian; the CRC covers the payload only.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{RebuildError, Result};
use crate::types::{PartitionType, RebuildState};

/// Frame header: length + CRC
pub const FRAME_HEADER_SIZE: usize = 8;

/// Result of one partition within an array rebuild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub part: PartitionType,
    pub result: RebuildState,
}

/// One completed array rebuild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildRecord {
    pub array_name: String,
    /// Unix millis
    pub started_at: u64,
    /// Unix millis
    pub finished_at: u64,
    pub rebuilt_segments: u32,
    pub partitions: Vec<PartitionRecord>,
    pub result: RebuildState,
}

/// Collects the record of an array rebuild while it runs
pub struct RebuildLogger {
    array_name: String,
    started_at: AtomicU64,
    rebuilt_segments: AtomicU32,
    partitions: Mutex<Vec<PartitionRecord>>,
}

impl RebuildLogger {
    pub fn new(array_name: impl Into<String>) -> Self {
        Self {
            array_name: array_name.into(),
            started_at: AtomicU64::new(0),
            rebuilt_segments: AtomicU32::new(0),
            partitions: Mutex::new(Vec::new()),
        }
    }

    pub fn set_start(&self) {
        self.started_at.store(now_millis(), Ordering::SeqCst);
    }

    pub fn add_rebuilt_segment(&self) {
        self.rebuilt_segments.fetch_add(1, Ordering::SeqCst);
    }

    pub fn rebuilt_segments(&self) -> u32 {
        self.rebuilt_segments.load(Ordering::SeqCst)
    }

    pub fn record_partition(&self, part: PartitionType, result: RebuildState) {
        self.partitions.lock().push(PartitionRecord { part, result });
    }

    /// Close the record with the final result
    pub fn finish(&self, result: RebuildState) -> RebuildRecord {
        RebuildRecord {
            array_name: self.array_name.clone(),
            started_at: self.started_at.load(Ordering::SeqCst),
            finished_at: now_millis(),
            rebuilt_segments: self.rebuilt_segments(),
            partitions: self.partitions.lock().clone(),
            result,
        }
    }

    // =========================================================================
    // Log File
    // =========================================================================

    /// Append one framed record to `path`, creating the file if needed
    pub fn write_log(path: &Path, record: &RebuildRecord) -> Result<()> {
        let payload =
            bincode::serialize(record).map_err(|e| RebuildError::Serialization(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| RebuildError::Serialization("record too large".to_string()))?;
        let crc = crc32fast::hash(&payload);

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&crc.to_le_bytes())?;
        writer.write_all(&payload)?;
        writer.flush()?;

        tracing::debug!(
            "Rebuild log of {} written to {}",
            record.array_name,
            path.display()
        );
        Ok(())
    }

    /// Read every record of `path`, verifying each frame
    pub fn read_log(path: &Path) -> Result<Vec<RebuildRecord>> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();

        loop {
            let mut header = [0u8; FRAME_HEADER_SIZE];
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            let mut payload = vec![0u8; len];
            reader.read_exact(&mut payload).map_err(|e| {
                if e.kind() == ErrorKind::UnexpectedEof {
                    RebuildError::LogCorruption(format!(
                        "record {} truncated, expected {} bytes",
                        records.len(),
                        len
                    ))
                } else {
                    RebuildError::Io(e)
                }
            })?;

            let actual = crc32fast::hash(&payload);
            if actual != crc {
                return Err(RebuildError::LogCorruption(format!(
                    "record {} crc mismatch: stored {:08x}, computed {:08x}",
                    records.len(),
                    crc,
                    actual
                )));
            }

            let record = bincode::deserialize(&payload)
                .map_err(|e| RebuildError::Serialization(e.to_string()))?;
            records.push(record);
        }

        Ok(records)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
