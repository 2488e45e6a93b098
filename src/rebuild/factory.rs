//! Rebuild Behavior Factory
//!
//! Picks the strategy for a partition and wires its pipelines.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{
    NToMRebuild, Raid1Rebuild, RebuildBehavior, RebuildContext, RebuildResources,
    SegmentAllocator, SegmentBasedRebuild, StripeBasedRebuild,
};
use crate::error::{RebuildError, Result};
use crate::locker::StripeLocker;
use crate::types::{PartitionType, RaidType};

/// Builds behaviors from rebuild contexts
///
/// | partition | RAID        | behavior             |
/// |-----------|-------------|----------------------|
/// | USER_DATA | any         | SegmentBasedRebuild  |
/// | other     | RAID1/10    | Raid1Rebuild         |
/// | other     | RAID5/6     | StripeBasedRebuild   |
pub struct RebuildBehaviorFactory {
    resources: RebuildResources,
    allocator: Option<Arc<dyn SegmentAllocator>>,
    lockers: BTreeMap<PartitionType, Arc<StripeLocker>>,
}

impl RebuildBehaviorFactory {
    pub fn new(resources: RebuildResources) -> Self {
        Self {
            resources,
            allocator: None,
            lockers: BTreeMap::new(),
        }
    }

    /// Allocator used by user data rebuilds
    pub fn with_allocator(mut self, allocator: Arc<dyn SegmentAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    /// Stripe locker guarding `part`
    pub fn with_locker(mut self, part: PartitionType, locker: Arc<StripeLocker>) -> Self {
        self.lockers.insert(part, locker);
        self
    }

    pub fn resources(&self) -> &RebuildResources {
        &self.resources
    }

    pub fn create_rebuild_behavior(&self, ctx: RebuildContext) -> Result<RebuildBehavior> {
        let ctx = Arc::new(ctx);

        if ctx.part == PartitionType::UserData {
            return self.segment_based(ctx);
        }

        match ctx.raid_type {
            RaidType::Raid1 | RaidType::Raid10 => {
                let locker = self.locker(ctx.part)?;
                Ok(RebuildBehavior::Raid1(Raid1Rebuild::new(
                    ctx,
                    self.resources.clone(),
                    locker,
                )?))
            }
            RaidType::Raid5 => {
                let locker = self.locker(ctx.part)?;
                Ok(RebuildBehavior::StripeBased(StripeBasedRebuild::new(
                    ctx,
                    self.resources.clone(),
                    locker,
                )?))
            }
            other => Err(RebuildError::Config(format!(
                "partition {} with {} cannot be rebuilt",
                ctx.part, other
            ))),
        }
    }

    fn segment_based(&self, ctx: Arc<RebuildContext>) -> Result<RebuildBehavior> {
        let allocator = self.allocator.clone().ok_or_else(|| {
            RebuildError::Config("user data rebuild needs a segment allocator".to_string())
        })?;

        let buf_cnt = ctx.size.stripes_per_segment as usize;
        let methods = ctx
            .pairs
            .iter()
            .enumerate()
            .map(|(index, pair)| {
                let owner = format!("{}_{}_{}", ctx.array_name, ctx.part, index);
                let mut method = NToMRebuild::new(
                    owner,
                    pair.clone(),
                    ctx.size,
                    buf_cnt,
                    self.resources.clone(),
                    ctx.failover_cursor(index),
                );
                if let Some(backup) = ctx.backup_pairs.get(index) {
                    method = method.with_backup(backup.clone());
                }
                Arc::new(method)
            })
            .collect();

        Ok(RebuildBehavior::SegmentBased(SegmentBasedRebuild::new(
            ctx,
            self.resources.clone(),
            allocator,
            methods,
        )?))
    }

    fn locker(&self, part: PartitionType) -> Result<Arc<StripeLocker>> {
        self.lockers
            .get(&part)
            .cloned()
            .ok_or_else(|| RebuildError::Config(format!("no stripe locker for partition {}", part)))
    }
}
