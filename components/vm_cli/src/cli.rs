//! Command-line arguments

use crate::programs::WorkloadKind;
use clap::Parser;
use tiering::{OptimizerConfig, DEFAULT_HOT_THRESHOLD};

/// Run a built-in workload on the tiered bytecode VM
#[derive(Parser, Debug, Clone)]
#[command(name = "tiervm", version, about = "Run bytecode workloads on the tiered VM")]
pub struct Cli {
    /// Program to run
    #[arg(short, long, value_enum, default_value_t = WorkloadKind::Counter)]
    pub workload: WorkloadKind,

    /// Calls from main into the worker function (workload default if omitted)
    #[arg(short, long)]
    pub calls: Option<u32>,

    /// Loop length, array length or Fibonacci argument (workload default if omitted)
    #[arg(short = 'n', long)]
    pub iterations: Option<u32>,

    /// Calls before a function is optimized
    #[arg(long, default_value_t = DEFAULT_HOT_THRESHOLD)]
    pub threshold: u64,

    /// Optimizer worker threads
    #[arg(long)]
    pub workers: Option<usize>,

    /// Run without the background optimizer
    #[arg(long)]
    pub no_optimize: bool,

    /// Print the module (and published functions) as a listing
    #[arg(long)]
    pub print_bytecode: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Log filter, e.g. `debug` or `tiering=trace` (overrides RUST_LOG)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Calls to make, after applying the workload default
    pub fn calls(&self) -> u32 {
        self.calls.unwrap_or_else(|| self.workload.default_calls())
    }

    /// Iterations to run, after applying the workload default
    pub fn iterations(&self) -> u32 {
        self.iterations
            .unwrap_or_else(|| self.workload.default_iterations())
    }

    /// Optimizer settings selected by the flags
    pub fn optimizer_config(&self) -> OptimizerConfig {
        let mut config = OptimizerConfig::default().with_hot_threshold(self.threshold);
        if let Some(workers) = self.workers {
            config = config
                .with_worker_threads(workers)
                .with_max_concurrent_jobs(workers);
        }
        config
    }
}
