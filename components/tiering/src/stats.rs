//! Optimizer statistics and per-function state

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of optimizer activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizerStats {
    /// Jobs admitted after a threshold crossing
    pub admitted: u64,
    /// Jobs that published an optimized function
    pub completed: u64,
    /// Jobs that produced nothing usable
    pub failed: u64,
    /// Jobs abandoned on admission timeout or shutdown
    pub cancelled: u64,
    /// Spans fused across all published functions
    pub total_rewrites: u64,
}

impl OptimizerStats {
    /// Jobs that reached a final state
    pub fn finished(&self) -> u64 {
        self.completed + self.failed + self.cancelled
    }
}

impl fmt::Display for OptimizerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "admitted={} completed={} failed={} cancelled={} rewrites={}",
            self.admitted, self.completed, self.failed, self.cancelled, self.total_rewrites
        )
    }
}

/// Where a function is in the tiering lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionState {
    /// Running original bytecode, no job pending
    Cold,
    /// A job has been admitted and not yet finished
    InFlight,
    /// An optimized version is published
    Optimized,
    /// Optimization failed; not retried this run
    Failed,
}

impl fmt::Display for FunctionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FunctionState::Cold => "cold",
            FunctionState::InFlight => "in-flight",
            FunctionState::Optimized => "optimized",
            FunctionState::Failed => "failed",
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub admitted: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
    pub total_rewrites: AtomicU64,
}

impl StatsCounters {
    pub fn snapshot(&self) -> OptimizerStats {
        OptimizerStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            total_rewrites: self.total_rewrites.load(Ordering::Relaxed),
        }
    }
}
