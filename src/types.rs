//! Core identifiers, geometry descriptors and state enums shared by every
//! rebuild component.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RebuildError, Result};

/// Identifier of a stripe within a partition
pub type StripeId = u32;

/// Identifier of a segment within a partition
pub type SegmentId = u32;

// =============================================================================
// Unit Constants
// =============================================================================

/// Smallest addressable device unit
pub const SECTOR_SIZE: u64 = 512;

/// Size of one logical block
pub const BLOCK_SIZE: u64 = 4096;

/// Sectors in one block
pub const SECTORS_PER_BLOCK: u64 = BLOCK_SIZE / SECTOR_SIZE;

/// Convert a byte length into sectors
pub fn bytes_to_sectors(bytes: u64) -> u64 {
    bytes / SECTOR_SIZE
}

// =============================================================================
// Devices and Addresses
// =============================================================================

/// Identifier of a member device of an array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev{}", self.0)
    }
}

/// Address on a physical member device, in sectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysicalBlkAddr {
    pub device: DeviceId,
    pub lba: u64,
}

/// Fault-tolerance domain address: a block offset inside a stripe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FtBlkAddr {
    pub stripe_id: StripeId,
    pub offset: u64,
}

// =============================================================================
// Partition and RAID Kinds
// =============================================================================

/// Array partitions, in the order rebuild visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PartitionType {
    MetaNvm,
    WriteBuffer,
    MetaSsd,
    JournalSsd,
    UserData,
}

impl PartitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionType::MetaNvm => "META_NVM",
            PartitionType::WriteBuffer => "WRITE_BUFFER",
            PartitionType::MetaSsd => "META_SSD",
            PartitionType::JournalSsd => "JOURNAL_SSD",
            PartitionType::UserData => "USER_DATA",
        }
    }
}

impl fmt::Display for PartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fault tolerance scheme of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaidType {
    None,
    Raid0,
    Raid1,
    Raid5,
    Raid6,
    Raid10,
}

impl fmt::Display for RaidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RaidType::None => "NONE",
            RaidType::Raid0 => "RAID0",
            RaidType::Raid1 => "RAID1",
            RaidType::Raid5 => "RAID5",
            RaidType::Raid6 => "RAID6",
            RaidType::Raid10 => "RAID10",
        };
        f.write_str(name)
    }
}

/// Quick rebuild only covers segments in use; full rebuild covers all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebuildKind {
    Quick,
    Full,
}

// =============================================================================
// Rebuild State
// =============================================================================

/// Result of a rebuild job
///
/// Ordered: everything at or above `Cancelled` stops new work, everything at
/// or above `Pass` is terminal. Transitions only move upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RebuildState {
    Ready = 0,
    Rebuilding = 1,
    Pass = 2,
    Cancelled = 3,
    Fail = 4,
}

impl RebuildState {
    /// PASS, CANCELLED or FAIL
    pub fn is_terminal(self) -> bool {
        self >= RebuildState::Pass
    }

    /// CANCELLED or FAIL: no new work may be issued
    pub fn is_stopped(self) -> bool {
        self >= RebuildState::Cancelled
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => RebuildState::Ready,
            1 => RebuildState::Rebuilding,
            2 => RebuildState::Pass,
            3 => RebuildState::Cancelled,
            _ => RebuildState::Fail,
        }
    }
}

impl fmt::Display for RebuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebuildState::Ready => "READY",
            RebuildState::Rebuilding => "REBUILDING",
            RebuildState::Pass => "PASS",
            RebuildState::Cancelled => "CANCELLED",
            RebuildState::Fail => "FAIL",
        };
        f.write_str(name)
    }
}

/// Mode of a stripe locker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockerMode {
    Normal,
    Busy,
}

// =============================================================================
// Geometry
// =============================================================================

/// Physical geometry of one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPhysicalSize {
    /// First sector of the partition on every member device
    pub start_lba: u64,
    pub blks_per_chunk: u32,
    pub chunks_per_stripe: u32,
    pub stripes_per_segment: u32,
    pub total_segments: u32,
}

impl PartitionPhysicalSize {
    /// Reject geometry the pipeline cannot address
    pub fn validate(&self) -> Result<()> {
        if self.blks_per_chunk == 0 {
            return Err(RebuildError::InvalidGeometry(
                "blks_per_chunk must not be zero".to_string(),
            ));
        }
        if self.chunks_per_stripe == 0 || self.stripes_per_segment == 0 {
            return Err(RebuildError::InvalidGeometry(format!(
                "chunks_per_stripe={} stripes_per_segment={}",
                self.chunks_per_stripe, self.stripes_per_segment
            )));
        }
        Ok(())
    }

    pub fn total_stripes(&self) -> u32 {
        self.total_segments * self.stripes_per_segment
    }

    pub fn chunk_bytes(&self) -> u64 {
        self.blks_per_chunk as u64 * BLOCK_SIZE
    }

    pub fn sectors_per_chunk(&self) -> u64 {
        self.blks_per_chunk as u64 * SECTORS_PER_BLOCK
    }

    /// Sector where `stripe_id` begins on every member device
    pub fn stripe_lba(&self, stripe_id: StripeId) -> u64 {
        self.start_lba + stripe_id as u64 * self.sectors_per_chunk()
    }

    /// One past the last sector of the partition on a member device
    pub fn last_lba(&self) -> u64 {
        self.stripe_lba(self.total_stripes())
    }
}
