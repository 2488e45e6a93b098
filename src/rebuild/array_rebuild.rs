//! Array Rebuild
//!
//! Rebuilds every partition of one array, one partition after another.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{
    RebuildBehavior, RebuildBehaviorFactory, RebuildCompleteHandler, RebuildContext,
    RebuildLogger, RebuildProgress, RebuildResult,
};
use crate::types::RebuildState;

/// Rebuild of all partitions of an array
///
/// ## Flow
/// ```text
///   start ──► partition 1 ──done──► partition 2 ──done──► ... ──► completed
///                  │                     │
///              FAIL/CANCELLED ───────────┴──► drop the rest ──► completed
/// ```
pub struct ArrayRebuild {
    array_name: String,
    tasks: Mutex<VecDeque<RebuildBehavior>>,
    progress: Arc<RebuildProgress>,
    logger: Arc<RebuildLogger>,
    log_path: Option<PathBuf>,
    state: AtomicU8,
    on_complete: Mutex<Option<RebuildCompleteHandler>>,
}

impl ArrayRebuild {
    /// Create behaviors for every context that has stripes to rebuild
    ///
    /// Contexts the factory cannot handle are logged and skipped.
    pub fn new(
        array_name: impl Into<String>,
        array_index: u32,
        contexts: Vec<RebuildContext>,
        factory: &RebuildBehaviorFactory,
        on_complete: RebuildCompleteHandler,
    ) -> Arc<Self> {
        let array_name = array_name.into();
        tracing::info!(
            "ArrayRebuild of {} with {} partitions",
            array_name,
            contexts.len()
        );

        let progress = Arc::new(RebuildProgress::new(array_name.clone()));
        let logger = Arc::new(RebuildLogger::new(array_name.clone()));

        let mut tasks = VecDeque::new();
        let mut total = 0u64;
        for mut ctx in contexts {
            if ctx.total_stripes() == 0 {
                tracing::debug!("Partition {} has nothing to rebuild", ctx.part);
                continue;
            }
            ctx.array_name = array_name.clone();
            ctx.array_index = array_index;
            ctx.progress = Arc::clone(&progress);
            ctx.logger = Some(Arc::clone(&logger));

            let part = ctx.part;
            let stripes = ctx.total_stripes() as u64;
            match factory.create_rebuild_behavior(ctx) {
                Ok(behavior) => {
                    total += stripes;
                    tasks.push_back(behavior);
                }
                Err(e) => {
                    tracing::error!("No rebuild behavior for partition {}: {}", part, e);
                }
            }
        }
        progress.set_total(total);
        logger.set_start();

        Arc::new(Self {
            array_name,
            tasks: Mutex::new(tasks),
            progress,
            logger,
            log_path: factory.resources().config.rebuild_log_path.clone(),
            state: AtomicU8::new(RebuildState::Ready as u8),
            on_complete: Mutex::new(Some(on_complete)),
        })
    }

    pub fn start(self: &Arc<Self>) {
        let count = self.tasks.lock().len();
        tracing::info!("ArrayRebuild of {} starting {} tasks", self.array_name, count);

        if count == 0 {
            self.completed(RebuildResult {
                array_name: self.array_name.clone(),
                part: None,
                result: RebuildState::Ready,
            });
        } else {
            self.rebuild_next();
        }
    }

    /// Abandon the rebuild before it started
    pub fn discard(&self) {
        tracing::error!(
            "ArrayRebuild of {} discarded, preparation failed",
            self.array_name
        );
        self.tasks.lock().clear();
        self.completed(RebuildResult {
            array_name: self.array_name.clone(),
            part: None,
            result: RebuildState::Fail,
        });
    }

    /// Cancel every remaining partition
    pub fn stop(&self) {
        for task in self.tasks.lock().iter() {
            task.stop_rebuilding();
        }
    }

    pub fn state(&self) -> RebuildState {
        RebuildState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Percentage over all partitions
    pub fn progress(&self) -> u64 {
        self.progress.current()
    }

    pub fn remaining_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn logger(&self) -> &Arc<RebuildLogger> {
        &self.logger
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn rebuild_next(self: &Arc<Self>) {
        let next = self.tasks.lock().front().cloned();
        let Some(task) = next else {
            return;
        };

        self.state.store(RebuildState::Rebuilding as u8, Ordering::Release);
        let weak: Weak<Self> = Arc::downgrade(self);
        task.context().set_complete_handler(Box::new(move |res| {
            if let Some(this) = weak.upgrade() {
                this.rebuild_done(res);
            }
        }));
        task.start();
    }

    fn rebuild_done(self: &Arc<Self>, res: RebuildResult) {
        tracing::info!(
            "ArrayRebuild of {}: partition {:?} done with {}",
            self.array_name,
            res.part,
            res.result
        );
        self.state.store(res.result as u8, Ordering::Release);
        if let Some(part) = res.part {
            self.logger.record_partition(part, res.result);
        }

        let empty = {
            let mut tasks = self.tasks.lock();
            tasks.pop_front();
            if res.result.is_stopped() {
                tasks.clear();
            }
            tasks.is_empty()
        };

        if empty {
            self.completed(RebuildResult {
                array_name: self.array_name.clone(),
                part: None,
                result: res.result,
            });
        } else {
            self.rebuild_next();
        }
    }

    fn completed(&self, res: RebuildResult) {
        self.state.store(res.result as u8, Ordering::Release);
        match res.result {
            RebuildState::Pass => {
                tracing::info!("Array {} rebuild completed successfully", self.array_name)
            }
            RebuildState::Fail => tracing::error!("Array {} rebuild failure", self.array_name),
            RebuildState::Cancelled => {
                tracing::warn!("Array {} rebuild cancelled", self.array_name)
            }
            other => tracing::debug!("Array {} rebuild ended as {}", self.array_name, other),
        }

        if let Some(path) = &self.log_path {
            let record = self.logger.finish(res.result);
            if let Err(e) = RebuildLogger::write_log(path, &record) {
                tracing::error!("Failed to write rebuild log of {}: {}", self.array_name, e);
            }
        }

        if let Some(on_complete) = self.on_complete.lock().take() {
            on_complete(res);
        }
    }
}
