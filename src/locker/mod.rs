//! Locker Module
//!
//! Per-partition mutual exclusion over stripe ids.
//!
//! ## Responsibilities
//! - Keep foreground writes and rebuild off the same stripe
//! - Gate the one-way NORMAL ⇄ BUSY mode transition used by mirror rebuild
//!
//! ## Modes
//! ```text
//!            try_change(Busy), working set empty
//!   NORMAL ─────────────────────────────────────► BUSY
//!     ▲                                             │
//!     └─────────────────────────────────────────────┘
//!            try_change(Normal), working set empty
//! ```
//! While a transition is pending the active state refuses new locks so its
//! working set can drain.

mod state;
mod stripe_locker;

pub use state::StripeLockerState;
pub use stripe_locker::StripeLocker;
