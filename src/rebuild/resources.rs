//! Collaborators shared by every rebuild job of a system.

use std::sync::Arc;

use crate::buffer::BufferPoolFactory;
use crate::config::RebuildConfig;
use crate::io::IoSubmitter;
use crate::recover::{IoRecover, RebuildRead};
use crate::scheduler::EventScheduler;

/// Handles to the I/O path, memory, scheduler and recovery registry
#[derive(Clone)]
pub struct RebuildResources {
    pub config: RebuildConfig,
    pub submitter: Arc<dyn IoSubmitter>,
    pub pool_factory: Arc<dyn BufferPoolFactory>,
    pub scheduler: Arc<dyn EventScheduler>,
    pub io_recover: Arc<IoRecover>,
}

impl RebuildResources {
    pub fn new(
        config: RebuildConfig,
        submitter: Arc<dyn IoSubmitter>,
        pool_factory: Arc<dyn BufferPoolFactory>,
        scheduler: Arc<dyn EventScheduler>,
        io_recover: Arc<IoRecover>,
    ) -> Self {
        Self {
            config,
            submitter,
            pool_factory,
            scheduler,
            io_recover,
        }
    }

    /// Degraded read path over these resources
    pub fn rebuild_read(&self) -> RebuildRead {
        RebuildRead::new(Arc::clone(&self.io_recover), Arc::clone(&self.submitter))
    }
}
