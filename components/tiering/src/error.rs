//! Optimizer errors

use thiserror::Error;

/// Errors raised while setting up the optimizer
///
/// Failures of individual optimization jobs are not errors at this level;
/// they are logged and the function keeps its original bytecode.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// The operating system refused to start a worker thread
    #[error("failed to spawn optimizer worker {index}: {source}")]
    WorkerSpawn {
        /// Worker number
        index: usize,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
