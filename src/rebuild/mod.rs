//! Rebuild Module
//!
//! Background reconstruction of a failed member device, partition by
//! partition.
//!
//! ## Responsibilities
//! - Hold per-job state: geometry, recovery paths, task counter, result
//!   (`RebuildContext`)
//! - Move data stripe by stripe through read → recover → write with an
//!   ordered failover chain (`NToMRebuild`)
//! - Pick and drive a strategy per partition (`RebuildBehavior`,
//!   `RebuildBehaviorFactory`)
//! - Sequence the partitions of an array and record the outcome
//!   (`ArrayRebuild`, `RebuildLogger`, `RebuildProgress`)
//!
//! ## Driving
//! ```text
//!   scheduler ──► Rebuilder ──► behavior.rebuild()
//!                                  │ Blocked  ──► requeued later
//!                                  │ Progressed
//!                                  ▼
//!                     stripes in flight ──(last completion)──► Rebuilder
//!                                  │ Done
//!                                  ▼
//!                           RebuildCompleted ──► completion handler
//! ```
//! Results only move upward: READY → REBUILDING → PASS | CANCELLED | FAIL.

mod array_rebuild;
mod behavior;
mod context;
mod factory;
mod logger;
mod n_to_m;
mod progress;
mod raid1;
mod recovery_base;
mod resources;
mod segment_based;
mod stripe_based;
mod sweep;

pub use array_rebuild::ArrayRebuild;
pub use behavior::{RebuildBehavior, RebuildCompleted, Rebuilder};
pub use context::{
    FailoverCursor, RebuildCompleteHandler, RebuildContext, RebuildPair, RebuildResult,
};
pub use factory::RebuildBehaviorFactory;
pub use logger::{PartitionRecord, RebuildLogger, RebuildRecord, FRAME_HEADER_SIZE};
pub use n_to_m::{NToMRebuild, StripeDone};
pub use progress::RebuildProgress;
pub use raid1::{MirrorWindow, Raid1Rebuild};
pub use recovery_base::RecoveryBase;
pub use resources::RebuildResources;
pub use segment_based::{RebuildTarget, SegmentAllocator, SegmentBasedRebuild};
pub use stripe_based::{ParityWindow, StripeBasedRebuild};
pub use sweep::{StripeSweep, SweepPolicy};
