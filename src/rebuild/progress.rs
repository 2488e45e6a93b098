//! Rebuild Progress
//!
//! Aggregate percent-complete over every partition of an array.

use std::collections::HashMap;

use parking_lot::Mutex;

struct ProgressInner {
    total: u64,
    sum: u64,
    /// Last reported count per contributor
    done: HashMap<String, u64>,
    percent: u64,
}

/// Running sum of per-contributor progress
///
/// Contributors report their own monotonically growing `done` count; only
/// the delta since their previous report is added.
pub struct RebuildProgress {
    name: String,
    inner: Mutex<ProgressInner>,
}

impl RebuildProgress {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(ProgressInner {
                total: 0,
                sum: 0,
                done: HashMap::new(),
                percent: 0,
            }),
        }
    }

    pub fn set_total(&self, total: u64) {
        let mut inner = self.inner.lock();
        inner.total = total;
        inner.percent = Self::percent_of(inner.sum, total);
    }

    pub fn total(&self) -> u64 {
        self.inner.lock().total
    }

    /// Record that `id` has finished `done` units; returns the percentage
    pub fn update(&self, id: &str, done: u64) -> u64 {
        let mut inner = self.inner.lock();
        let previous = inner.done.insert(id.to_string(), done);
        let delta = match previous {
            Some(previous) => done.saturating_sub(previous),
            None => done,
        };
        inner.sum += delta;

        let percent = Self::percent_of(inner.sum, inner.total);
        if percent != inner.percent {
            inner.percent = percent;
            tracing::info!("Rebuild progress of {}: {}%", self.name, percent);
        }
        percent
    }

    /// Current percentage
    pub fn current(&self) -> u64 {
        self.inner.lock().percent
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn percent_of(sum: u64, total: u64) -> u64 {
        if total == 0 {
            return 0;
        }
        (sum * 100 / total).min(100)
    }
}
