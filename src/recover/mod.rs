//! Recover Module
//!
//! On-demand reconstruction of data that lives on an unavailable device.
//!
//! ## Responsibilities
//! - Register, per array, how each partition can recover an address
//!   (`IoRecover`)
//! - Describe mirror and parity recovery groups of a partition
//!   (`PartitionRecovery`)
//! - Serve one degraded read by reading the recovery group and running the
//!   recovery function (`RebuildRead`)
//!
//! ## Degraded Read
//! ```text
//!   request(dev X, lba L) ──► IoRecover lookup ──► plan { sources, func }
//!                                                     │
//!                    one sub-read per source ◄────────┘
//!                                │ (all landed)
//!                     func(window, sources) ──► copy into request ──► complete
//! ```

mod func;
mod io_recover;
mod partition;
mod rebuild_read;

pub use func::{mirror_copy, xor_recover, RecoverFunc};
pub use io_recover::{IoRecover, RecoverMethod, RecoverMethodGetter, RecoverMethodMap};
pub use partition::{AddressTranslator, PartitionRecovery};
pub use rebuild_read::{RebuildRead, RejectedRequest};
pub(crate) use rebuild_read::rejection_status;
