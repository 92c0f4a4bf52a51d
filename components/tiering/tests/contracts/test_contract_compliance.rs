//! Contract compliance tests for tiering
//! Verifies the control surface hosts rely on

use bytecode_system::{BytecodeModule, CompiledFunction, ModuleBuilder};
use interpreter::CallProfiler;
use std::sync::Arc;
use std::time::Duration;
use tiering::{
    AdmissionGate, FunctionState, OptimizationManager, OptimizerConfig, OptimizerError,
    OptimizerStats, DEFAULT_ADMISSION_TIMEOUT, DEFAULT_HOT_THRESHOLD,
};

fn empty_module() -> Arc<BytecodeModule> {
    Arc::new(ModuleBuilder::new().build())
}

/// Verify the documented defaults
#[test]
fn test_contract_defaults() {
    assert_eq!(DEFAULT_HOT_THRESHOLD, 1000);
    assert_eq!(DEFAULT_ADMISSION_TIMEOUT, Duration::from_secs(5));
    let workers = OptimizerConfig::default().worker_threads;
    let expected = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(4);
    assert_eq!(workers, expected);
}

/// Verify the control surface signatures
#[test]
fn test_contract_control_surface() {
    let result: Result<OptimizationManager, OptimizerError> =
        OptimizationManager::new(empty_module(), OptimizerConfig::default());
    let manager = result.unwrap();
    manager.enable();
    manager.disable();
    let _: bool = manager.is_optimization_enabled();
    let _: OptimizerStats = manager.stats();
    let _: FunctionState = manager.function_state("f");
    let _: u64 = manager.call_count("f");
    let _: Option<Arc<CompiledFunction>> = manager.optimized("f");
    let _: bool = manager.wait_until_idle(Duration::from_millis(10));
    manager.shutdown();
}

/// Verify the manager is usable as the interpreter's profiler
#[test]
fn test_contract_is_call_profiler() {
    let manager = OptimizationManager::new(empty_module(), OptimizerConfig::default()).unwrap();
    let profiler: Arc<dyn CallProfiler> = Arc::new(manager);
    assert!(profiler.optimized_function(0).is_none());
}

/// Verify gate permits are scoped
#[test]
fn test_contract_gate() {
    let gate = AdmissionGate::new(1);
    {
        let _permit = gate.acquire_timeout(Duration::ZERO).unwrap();
        assert_eq!(gate.available(), 0);
    }
    assert_eq!(gate.available(), 1);
}
