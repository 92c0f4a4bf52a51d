//! Runtime orchestration for workload execution
//!
//! The Runtime wires the components together:
//! - the workload module from `programs`
//! - the interpreter VM
//! - the background optimizer, installed as the VM's call profiler

use crate::error::CliResult;
use crate::programs::WorkloadKind;
use core_types::VmResult;
use interpreter::VM;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiering::{FunctionState, OptimizationManager, OptimizerConfig, OptimizerStats};
use tracing::{debug, info, warn};

/// How long to wait for pending optimizations after the run
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Tiering outcome for one function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionReport {
    /// Function name
    pub name: String,
    /// Calls counted before the function was published or failed
    pub calls: u64,
    /// Final tiering state
    pub state: FunctionState,
    /// Instruction count of the original bytecode
    pub instructions: usize,
    /// Instruction count of the published version, if any
    pub optimized_instructions: Option<usize>,
}

/// Everything a run produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Workload that ran
    pub workload: WorkloadKind,
    /// Calls from main
    pub calls: u32,
    /// Loop length or argument
    pub iterations: u32,
    /// Whether the optimizer was attached
    pub optimize: bool,
    /// Result code
    pub result: VmResult,
    /// Printed lines
    pub output: Vec<String>,
    /// Whether the printed total matches the closed form
    pub verified: bool,
    /// Instructions dispatched
    pub instructions_executed: u64,
    /// Arrays still live after the run
    pub live_arrays: usize,
    /// Wall-clock time of the interpreter run
    pub elapsed_ms: f64,
    /// Optimizer counters (all zero when disabled)
    pub optimizer: OptimizerStats,
    /// Per-function tiering state
    pub functions: Vec<FunctionReport>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.output {
            writeln!(f, "{}", line)?;
        }
        writeln!(
            f,
            "workload: {} (calls={}, iterations={})",
            self.workload, self.calls, self.iterations
        )?;
        writeln!(f, "result: {}", self.result)?;
        writeln!(f, "verified: {}", self.verified)?;
        writeln!(
            f,
            "executed: {} instructions in {:.2} ms",
            self.instructions_executed, self.elapsed_ms
        )?;
        writeln!(f, "live arrays: {}", self.live_arrays)?;
        if self.optimize {
            writeln!(f, "optimizer: {}", self.optimizer)?;
            for function in &self.functions {
                write!(
                    f,
                    "  {:<10} calls={:<8} {}",
                    function.name, function.calls, function.state
                )?;
                if let Some(after) = function.optimized_instructions {
                    write!(f, " ({} -> {} instructions)", function.instructions, after)?;
                }
                writeln!(f)?;
            }
        } else {
            writeln!(f, "optimizer: disabled")?;
        }
        Ok(())
    }
}

/// Runs one workload end to end
#[derive(Debug, Clone)]
pub struct Runtime {
    workload: WorkloadKind,
    calls: u32,
    iterations: u32,
    optimize: bool,
    print_bytecode: bool,
    config: OptimizerConfig,
}

impl Runtime {
    /// Create a runtime for a workload with its default sizes
    ///
    /// # Example
    /// ```
    /// use core_types::VmResult;
    /// use vm_cli::{Runtime, WorkloadKind};
    ///
    /// let report = Runtime::new(WorkloadKind::Counter)
    ///     .with_calls(5)
    ///     .with_iterations(10)
    ///     .run()
    ///     .unwrap();
    /// assert_eq!(report.result, VmResult::Success);
    /// assert_eq!(report.output, vec!["50".to_string()]);
    /// ```
    pub fn new(workload: WorkloadKind) -> Self {
        Self {
            workload,
            calls: workload.default_calls(),
            iterations: workload.default_iterations(),
            optimize: true,
            print_bytecode: false,
            config: OptimizerConfig::default(),
        }
    }

    /// Set the number of calls from main
    pub fn with_calls(mut self, calls: u32) -> Self {
        self.calls = calls;
        self
    }

    /// Set the loop length or argument
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Attach or omit the optimizer
    pub fn with_optimization(mut self, enabled: bool) -> Self {
        self.optimize = enabled;
        self
    }

    /// Print listings to stdout
    pub fn with_print_bytecode(mut self, enabled: bool) -> Self {
        self.print_bytecode = enabled;
        self
    }

    /// Use explicit optimizer settings
    pub fn with_optimizer_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Assemble, execute and report
    pub fn run(&self) -> CliResult<RunReport> {
        let module = Arc::new(self.workload.build(self.calls, self.iterations)?);
        if self.print_bytecode {
            println!("{}", module.disassemble());
        }

        let manager = if self.optimize {
            Some(Arc::new(OptimizationManager::new(
                Arc::clone(&module),
                self.config.clone(),
            )?))
        } else {
            None
        };

        let mut vm = VM::new();
        if let Some(manager) = &manager {
            vm = vm.with_profiler(manager.clone());
        }

        info!(workload = %self.workload, calls = self.calls, iterations = self.iterations, "running");
        let started = Instant::now();
        let (result, _) = vm.run_entry_point(&module, &[]);
        let elapsed = started.elapsed();
        debug!(result = %result, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "run finished");

        let output = vm.take_output();
        let expected = self.workload.expected_total(self.calls, self.iterations).to_string();
        let verified = result.is_success() && output.last() == Some(&expected);
        if result.is_success() && !verified {
            warn!(expected = %expected, "printed total does not match");
        }

        let (optimizer, functions) = match &manager {
            Some(manager) => {
                if !manager.wait_until_idle(IDLE_TIMEOUT) {
                    warn!("optimizer still busy after {:?}", IDLE_TIMEOUT);
                }
                let functions = module
                    .functions
                    .iter()
                    .map(|function| FunctionReport {
                        name: function.name.clone(),
                        calls: manager.call_count(&function.name),
                        state: manager.function_state(&function.name),
                        instructions: function.instruction_count(),
                        optimized_instructions: manager
                            .optimized(&function.name)
                            .map(|f| f.instruction_count()),
                    })
                    .collect();
                if self.print_bytecode {
                    for function in &module.functions {
                        if let Some(optimized) = manager.optimized(&function.name) {
                            println!("; optimized");
                            println!("{}", optimized.disassemble(Some(&module)));
                        }
                    }
                }
                manager.shutdown();
                (manager.stats(), functions)
            }
            None => (OptimizerStats::default(), Vec::new()),
        };

        let stats = vm.stats();
        Ok(RunReport {
            workload: self.workload,
            calls: self.calls,
            iterations: self.iterations,
            optimize: self.optimize,
            result,
            output,
            verified,
            instructions_executed: stats.instructions_executed,
            live_arrays: vm.heap_stats().live_count,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            optimizer,
            functions,
        })
    }
}
