//! Scheduler Module
//!
//! Deferred execution of rebuild continuations and completion notices.
//!
//! ## Responsibilities
//! - Run queued events outside the caller's stack (bounds recursion depth)
//! - Re-run blocked events later instead of spinning on them
//!
//! ## Implementations
//! - `WorkerScheduler`: crossbeam channel feeding a pool of worker threads,
//!   plus a timer thread that re-injects blocked events after a delay
//! - `ManualScheduler`: single queue driven explicitly by the caller

mod worker;
mod manual;

pub use worker::WorkerScheduler;
pub use manual::ManualScheduler;

/// Outcome of one execution of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Work was issued; completions will schedule whatever comes next
    Progressed,
    /// Nothing could be done now; run this event again later
    Blocked,
    /// The event has nothing left to do
    Done,
}

/// A unit of deferred work
pub trait Event: Send {
    fn execute(&mut self) -> Progress;

    /// Short name used in log lines
    fn name(&self) -> &'static str {
        "event"
    }
}

/// Event backed by a closure
pub struct FnEvent<F> {
    name: &'static str,
    f: F,
}

impl<F> FnEvent<F>
where
    F: FnMut() -> Progress + Send + 'static,
{
    pub fn boxed(name: &'static str, f: F) -> Box<dyn Event> {
        Box::new(Self { name, f })
    }
}

impl<F> Event for FnEvent<F>
where
    F: FnMut() -> Progress + Send,
{
    fn execute(&mut self) -> Progress {
        (self.f)()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Accepts events for later execution
pub trait EventScheduler: Send + Sync {
    fn enqueue(&self, event: Box<dyn Event>);
}
