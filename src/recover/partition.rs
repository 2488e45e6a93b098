//! Partition recovery groups
//!
//! Which member devices can stand in for a lost one, per RAID layout, and
//! how fault-tolerance addresses land on devices.

use std::sync::Arc;

use super::{mirror_copy, xor_recover, RecoverFunc, RecoverMethod, RecoverMethodGetter};
use crate::error::{RebuildError, Result};
use crate::rebuild::RebuildPair;
use crate::types::{
    DeviceId, FtBlkAddr, PartitionPhysicalSize, PartitionType, PhysicalBlkAddr, RaidType,
    SECTORS_PER_BLOCK,
};

/// Maps a fault-tolerance address to the device address it lives at
pub type AddressTranslator = Arc<dyn Fn(FtBlkAddr) -> PhysicalBlkAddr + Send + Sync>;

/// Recovery description of one partition
///
/// `devices[i]` holds chunk `i` of every stripe. Mirrored layouts pair
/// device `i` with device `i + n/2`.
pub struct PartitionRecovery {
    part: PartitionType,
    raid_type: RaidType,
    size: PartitionPhysicalSize,
    devices: Vec<DeviceId>,
    recover_func: RecoverFunc,
}

impl PartitionRecovery {
    pub fn new(
        part: PartitionType,
        raid_type: RaidType,
        size: PartitionPhysicalSize,
        devices: Vec<DeviceId>,
    ) -> Result<Self> {
        size.validate()?;
        if devices.len() != size.chunks_per_stripe as usize {
            return Err(RebuildError::InvalidGeometry(format!(
                "{} devices for {} chunks per stripe",
                devices.len(),
                size.chunks_per_stripe
            )));
        }

        let recover_func = match raid_type {
            RaidType::Raid1 | RaidType::Raid10 => {
                if devices.len() % 2 != 0 {
                    return Err(RebuildError::InvalidGeometry(format!(
                        "{} needs an even device count, got {}",
                        raid_type,
                        devices.len()
                    )));
                }
                mirror_copy()
            }
            RaidType::Raid5 => {
                if devices.len() < 3 {
                    return Err(RebuildError::InvalidGeometry(format!(
                        "RAID5 needs at least 3 devices, got {}",
                        devices.len()
                    )));
                }
                xor_recover()
            }
            other => {
                return Err(RebuildError::InvalidGeometry(format!(
                    "{} has no recovery group",
                    other
                )))
            }
        };

        Ok(Self {
            part,
            raid_type,
            size,
            devices,
            recover_func,
        })
    }

    pub fn part(&self) -> PartitionType {
        self.part
    }

    pub fn raid_type(&self) -> RaidType {
        self.raid_type
    }

    pub fn size(&self) -> &PartitionPhysicalSize {
        &self.size
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    pub fn recover_func(&self) -> RecoverFunc {
        Arc::clone(&self.recover_func)
    }

    /// Whether `lba` falls inside this partition
    pub fn is_valid_lba(&self, lba: u64) -> bool {
        lba >= self.size.start_lba && lba < self.size.last_lba()
    }

    /// Chunk index of `device` in every stripe
    pub fn find_device(&self, device: DeviceId) -> Option<usize> {
        self.devices.iter().position(|d| *d == device)
    }

    /// Chunk indexes that together reproduce chunk `index`
    pub fn rebuild_group(&self, index: usize) -> Vec<usize> {
        let n = self.devices.len();
        match self.raid_type {
            RaidType::Raid1 | RaidType::Raid10 => vec![(index + n / 2) % n],
            _ => (0..n).filter(|i| *i != index).collect(),
        }
    }

    /// Device address of a fault-tolerance address
    pub fn translate(&self, fta: FtBlkAddr) -> PhysicalBlkAddr {
        let blks = self.size.blks_per_chunk as u64;
        let chunk = (fta.offset / blks) as usize;
        let block = fta.stripe_id as u64 * blks + fta.offset % blks;
        PhysicalBlkAddr {
            device: self.devices[chunk % self.devices.len()],
            lba: self.size.start_lba + block * SECTORS_PER_BLOCK,
        }
    }

    /// Translator closure over a shared description
    pub fn translator(self: &Arc<Self>) -> AddressTranslator {
        let this = Arc::clone(self);
        Arc::new(move |fta| this.translate(fta))
    }

    /// Recovery path that rebuilds every chunk held by `fault_idx`
    pub fn rebuild_pair(&self, fault_idx: usize) -> RebuildPair {
        let srcs = self
            .rebuild_group(fault_idx)
            .into_iter()
            .map(|i| self.devices[i])
            .collect();
        RebuildPair::new(srcs, vec![self.devices[fault_idx]], self.recover_func())
    }
}

impl RecoverMethodGetter for PartitionRecovery {
    fn get_recover_method(&self, addr: PhysicalBlkAddr, _sectors: u64) -> Option<RecoverMethod> {
        if !self.is_valid_lba(addr.lba) {
            return None;
        }
        let index = self.find_device(addr.device)?;

        let src_addrs = self
            .rebuild_group(index)
            .into_iter()
            .map(|i| PhysicalBlkAddr {
                device: self.devices[i],
                lba: addr.lba,
            })
            .collect();

        Some(RecoverMethod {
            src_addrs,
            recover_func: self.recover_func(),
        })
    }
}
