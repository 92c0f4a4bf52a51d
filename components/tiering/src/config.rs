//! Optimizer configuration

use std::thread;
use std::time::Duration;

/// Calls before a function is considered hot
pub const DEFAULT_HOT_THRESHOLD: u64 = 1000;

/// Upper bound on the default worker count
pub const MAX_DEFAULT_WORKERS: usize = 4;

/// How long a queued job waits for an admission slot
pub const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `shutdown` waits for workers to exit
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for the background optimizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// Call count at which a function becomes eligible for optimization
    pub hot_threshold: u64,
    /// Number of worker threads
    pub worker_threads: usize,
    /// Optimizations allowed to run at the same time
    pub max_concurrent_jobs: usize,
    /// Bounded wait for an admission slot before a job is cancelled
    pub admission_timeout: Duration,
    /// Bounded wait for workers to drain during shutdown
    pub shutdown_timeout: Duration,
    /// Whether call notifications are accepted from the start
    pub enabled: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let workers = default_worker_threads();
        Self {
            hot_threshold: DEFAULT_HOT_THRESHOLD,
            worker_threads: workers,
            max_concurrent_jobs: workers,
            admission_timeout: DEFAULT_ADMISSION_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            enabled: true,
        }
    }
}

impl OptimizerConfig {
    /// Set the hot threshold (at least 1)
    pub fn with_hot_threshold(mut self, threshold: u64) -> Self {
        self.hot_threshold = threshold.max(1);
        self
    }

    /// Set the worker count (at least 1)
    pub fn with_worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers.max(1);
        self
    }

    /// Set the admission gate size (at least 1)
    pub fn with_max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.max_concurrent_jobs = jobs.max(1);
        self
    }

    /// Set the admission timeout
    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    /// Set the shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Start enabled or disabled
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// `min(available_parallelism, 4)`, falling back to one worker
pub fn default_worker_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}
