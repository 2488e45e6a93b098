//! Worker Scheduler
//!
//! Thread pool fed through a crossbeam channel. Blocked events are handed
//! to a timer thread and come back after `requeue_delay`.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::cmp::Reverse;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::{Event, EventScheduler, Progress};
use crate::config::RebuildConfig;
use crate::error::{RebuildError, Result};

enum Job {
    Run(Box<dyn Event>),
    Shutdown,
}

enum TimerMsg {
    Delay(Instant, Box<dyn Event>),
    Shutdown,
}

/// Blocked event waiting for its deadline
struct Delayed {
    deadline: Instant,
    seq: u64,
    event: Box<dyn Event>,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// Multi-threaded event scheduler
///
/// ## Threads
/// - `worker_threads` workers pull events from one shared channel
/// - one timer thread parks blocked events until their deadline
pub struct WorkerScheduler {
    jobs: Sender<Job>,
    timer: Sender<TimerMsg>,
    worker_count: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerScheduler {
    /// Spawn the worker and timer threads
    pub fn start(config: &RebuildConfig) -> Result<Self> {
        config.validate()?;

        let (jobs_tx, jobs_rx) = channel::unbounded::<Job>();
        let (timer_tx, timer_rx) = channel::unbounded::<TimerMsg>();

        let mut handles = Vec::with_capacity(config.worker_threads);
        for id in 0..config.worker_threads {
            let rx = jobs_rx.clone();
            let timer = timer_tx.clone();
            let delay = config.requeue_delay;
            let handle = thread::Builder::new()
                .name(format!("rebuild-worker-{}", id))
                .spawn(move || Self::worker_loop(rx, timer, delay))
                .map_err(RebuildError::Io)?;
            handles.push(handle);
        }

        let requeue = jobs_tx.clone();
        let timer_handle = thread::Builder::new()
            .name("rebuild-timer".to_string())
            .spawn(move || Self::timer_loop(timer_rx, requeue))
            .map_err(RebuildError::Io)?;

        tracing::debug!("WorkerScheduler started with {} workers", config.worker_threads);

        Ok(Self {
            jobs: jobs_tx,
            timer: timer_tx,
            worker_count: config.worker_threads,
            handles: Mutex::new(handles),
            timer_handle: Mutex::new(Some(timer_handle)),
        })
    }

    /// Stop all threads; queued events that have not started are dropped
    pub fn shutdown(&self) {
        let _ = self.timer.send(TimerMsg::Shutdown);
        if let Some(handle) = self.timer_handle.lock().take() {
            let _ = handle.join();
        }

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for _ in 0..handles.len() {
            let _ = self.jobs.send(Job::Shutdown);
        }

        // The last reference may be dropped by an event on a worker thread
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    // =========================================================================
    // Thread Bodies
    // =========================================================================

    fn worker_loop(rx: Receiver<Job>, timer: Sender<TimerMsg>, delay: Duration) {
        for job in rx.iter() {
            match job {
                Job::Run(mut event) => {
                    if event.execute() == Progress::Blocked {
                        let deadline = Instant::now() + delay;
                        if timer.send(TimerMsg::Delay(deadline, event)).is_err() {
                            tracing::debug!("Timer stopped, dropping blocked event");
                        }
                    }
                }
                Job::Shutdown => break,
            }
        }
    }

    fn timer_loop(rx: Receiver<TimerMsg>, jobs: Sender<Job>) {
        let mut parked: BinaryHeap<Reverse<Delayed>> = BinaryHeap::new();
        let mut seq = 0u64;

        loop {
            // Release everything that is due
            let now = Instant::now();
            while parked
                .peek()
                .map(|Reverse(d)| d.deadline <= now)
                .unwrap_or(false)
            {
                if let Some(Reverse(due)) = parked.pop() {
                    let _ = jobs.send(Job::Run(due.event));
                }
            }

            let msg = match parked.peek() {
                Some(Reverse(next)) => {
                    let wait = next.deadline.saturating_duration_since(Instant::now());
                    match rx.recv_timeout(wait) {
                        Ok(msg) => msg,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match rx.recv() {
                    Ok(msg) => msg,
                    Err(_) => break,
                },
            };

            match msg {
                TimerMsg::Delay(deadline, event) => {
                    seq += 1;
                    parked.push(Reverse(Delayed { deadline, seq, event }));
                }
                TimerMsg::Shutdown => break,
            }
        }
    }
}

impl EventScheduler for WorkerScheduler {
    fn enqueue(&self, event: Box<dyn Event>) {
        if self.jobs.send(Job::Run(event)).is_err() {
            tracing::warn!("WorkerScheduler is stopped, event dropped");
        }
    }
}

impl Drop for WorkerScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
