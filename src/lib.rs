//! # raidmend
//!
//! RAID rebuild and data-reconstruction engine of a log-structured block
//! storage array:
//! - Stripe locking with a NORMAL/BUSY mode gate
//! - Asynchronous read → recover → write pipeline with permanent failover
//! - Inline degraded-read reconstruction for foreground I/O
//! - Per-partition rebuild strategies driven by a cooperative scheduler
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ArrayRebuild                           │
//! │            (partitions in order, rebuild log)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ RebuildBehaviorFactory
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   RebuildBehavior                           │
//! │     SegmentBased  │   Raid1   │   StripeBased               │
//! └────────┬──────────┴─────┬─────┴──────────┬──────────────────┘
//!          │                │                │
//!          ▼                ▼                ▼
//!   ┌─────────────┐  ┌─────────────┐  ┌─────────────┐
//!   │ NToMRebuild │  │ RebuildRead │  │StripeLocker │
//!   │ (failover)  │  │ (IoRecover) │  │(NORMAL/BUSY)│
//!   └──────┬──────┘  └──────┬──────┘  └─────────────┘
//!          │                │
//!          ▼                ▼
//!   ┌─────────────────────────────┐   ┌─────────────────┐
//!   │  IoSubmitter (async I/O)    │   │ EventScheduler  │
//!   │  BufferPool (slots)         │   │ (continuations) │
//!   └─────────────────────────────┘   └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod types;

pub mod buffer;
pub mod io;
pub mod locker;
pub mod scheduler;
pub mod recover;
pub mod rebuild;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RebuildError, Result};
pub use config::RebuildConfig;
pub use types::{
    DeviceId, FtBlkAddr, LockerMode, PartitionPhysicalSize, PartitionType, PhysicalBlkAddr,
    RaidType, RebuildKind, RebuildState, SegmentId, StripeId,
};
pub use rebuild::{ArrayRebuild, RebuildBehavior, RebuildBehaviorFactory, RebuildContext};
pub use scheduler::Progress;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of raidmend
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
