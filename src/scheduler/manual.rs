//! Manual Scheduler
//!
//! Single FIFO queue executed only when the owner asks. Gives a
//! deterministic interleaving for tests and single-threaded drivers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{Event, EventScheduler, Progress};

/// Caller-driven event queue
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<Box<dyn Event>>>,
    executed: AtomicU64,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute the oldest event; a blocked event goes to the back
    pub fn run_once(&self) -> Option<Progress> {
        // Lock released while the event runs, it may enqueue more events
        let mut event = self.queue.lock().pop_front()?;
        let progress = event.execute();
        self.executed.fetch_add(1, Ordering::SeqCst);

        if progress == Progress::Blocked {
            tracing::trace!("{} blocked, requeued", event.name());
            self.queue.lock().push_back(event);
        }
        Some(progress)
    }

    /// Execute events until the queue is empty or `max_steps` ran
    pub fn run_until_idle(&self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps && self.run_once().is_some() {
            steps += 1;
        }
        steps
    }

    /// Execute events until `done` holds, the queue is empty, or
    /// `max_steps` ran. Returns whether `done` holds.
    pub fn run_until<F>(&self, max_steps: usize, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let mut steps = 0;
        while !done() {
            if steps >= max_steps || self.run_once().is_none() {
                return done();
            }
            steps += 1;
        }
        true
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Total executions so far
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::SeqCst)
    }
}

impl EventScheduler for ManualScheduler {
    fn enqueue(&self, event: Box<dyn Event>) {
        self.queue.lock().push_back(event);
    }
}
