//! Configuration for raidmend
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RebuildError, Result};

/// Main configuration for the rebuild engine
#[derive(Debug, Clone)]
pub struct RebuildConfig {
    // -------------------------------------------------------------------------
    // Initialization
    // -------------------------------------------------------------------------
    /// How many times a behavior retries buffer pool allocation before the
    /// job is failed
    pub init_retry_max: u32,

    /// NUMA node hint passed to the buffer pool factory
    pub numa_hint: u32,

    // -------------------------------------------------------------------------
    // Scheduling
    // -------------------------------------------------------------------------
    /// Delay before a blocked event is executed again
    pub requeue_delay: Duration,

    /// Number of worker threads in the `WorkerScheduler`
    pub worker_threads: usize,

    // -------------------------------------------------------------------------
    // Rebuild Log
    // -------------------------------------------------------------------------
    /// Where completed rebuild records are appended (None disables the log)
    pub rebuild_log_path: Option<PathBuf>,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            init_retry_max: 1000,
            numa_hint: 0,
            requeue_delay: Duration::from_micros(100),
            worker_threads: 4,
            rebuild_log_path: None,
        }
    }
}

impl RebuildConfig {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.init_retry_max == 0 {
            return Err(RebuildError::Config(
                "init_retry_max must be at least 1".to_string(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(RebuildError::Config(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for RebuildConfig
#[derive(Default)]
pub struct ConfigBuilder {
    config: RebuildConfig,
}

impl ConfigBuilder {
    /// Set the buffer allocation retry budget
    pub fn init_retry_max(mut self, count: u32) -> Self {
        self.config.init_retry_max = count;
        self
    }

    /// Set the NUMA node hint for buffer pools
    pub fn numa_hint(mut self, numa: u32) -> Self {
        self.config.numa_hint = numa;
        self
    }

    /// Set the delay before a blocked event runs again
    pub fn requeue_delay(mut self, delay: Duration) -> Self {
        self.config.requeue_delay = delay;
        self
    }

    /// Set the number of scheduler worker threads
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Set the rebuild log file
    pub fn rebuild_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.rebuild_log_path = Some(path.into());
        self
    }

    pub fn build(self) -> RebuildConfig {
        self.config
    }
}
