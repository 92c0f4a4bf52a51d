//! Enable, disable, shutdown and statistics

use bytecode_system::{CompiledFunction, InstructionBuilder, ModuleBuilder, Opcode};
use core_types::{ValueType, VmResult};
use interpreter::{CallProfiler, VM};
use std::sync::Arc;
use std::time::Duration;
use tiering::{FunctionState, OptimizationManager, OptimizerConfig, OptimizerStats};

/// `step` increments its local; `main` calls it `calls` times
fn program(calls: usize) -> Arc<bytecode_system::BytecodeModule> {
    let mut module = ModuleBuilder::new();
    let one = module.add_int_constant(1) as i64;

    let mut step = InstructionBuilder::new();
    step.emit(Opcode::PushInt, one)
        .emit(Opcode::StoreLocal, 0)
        .emit(Opcode::LoadLocal, 0)
        .emit(Opcode::PushInt, one)
        .emit(Opcode::AddInt, 0)
        .emit(Opcode::StoreLocal, 0)
        .emit(Opcode::LoadLocal, 0)
        .emit(Opcode::Return, 0);
    let step_index =
        module.add_function(CompiledFunction::new("step", vec![], ValueType::Int, 1, step.build()));

    let mut main = InstructionBuilder::new();
    for _ in 0..calls {
        main.emit(Opcode::Call, step_index as i64).emit(Opcode::Pop, 0);
    }
    main.emit(Opcode::ReturnVoid, 0);
    module.add_function(CompiledFunction::new("main", vec![], ValueType::Void, 0, main.build()));
    module.entry_point("main");
    Arc::new(module.build())
}

fn manager(module: &Arc<bytecode_system::BytecodeModule>, config: OptimizerConfig) -> Arc<OptimizationManager> {
    Arc::new(OptimizationManager::new(Arc::clone(module), config).unwrap())
}

#[test]
fn test_vm_drives_optimization() {
    let module = program(10);
    let manager = manager(&module, OptimizerConfig::default().with_hot_threshold(4));
    let mut vm = VM::new().with_profiler(manager.clone());

    let (code, _) = vm.run_entry_point(&module, &[]);
    assert_eq!(code, VmResult::Success);
    assert!(manager.wait_until_idle(Duration::from_secs(10)));
    let counted = manager.call_count("step");
    assert!((4..=10).contains(&counted), "counted {counted}");
    assert_eq!(manager.function_state("step"), FunctionState::Optimized);
    assert_eq!(manager.call_count("main"), 0);
}

#[test]
fn test_disable_stops_counting() {
    let module = program(10);
    let manager = manager(&module, OptimizerConfig::default().with_hot_threshold(4));
    manager.disable();
    let mut vm = VM::new().with_profiler(manager.clone());

    assert_eq!(vm.run_entry_point(&module, &[]).0, VmResult::Success);
    assert_eq!(manager.call_count("step"), 0);
    assert_eq!(manager.function_state("step"), FunctionState::Cold);
    assert_eq!(manager.stats(), OptimizerStats::default());
}

#[test]
fn test_starts_disabled_from_config() {
    let module = program(1);
    let manager = manager(&module, OptimizerConfig::default().with_enabled(false));
    assert!(!manager.is_optimization_enabled());
    manager.enable();
    assert!(manager.is_optimization_enabled());
}

#[test]
fn test_shutdown_stops_admission() {
    let module = program(1);
    let manager = manager(&module, OptimizerConfig::default().with_hot_threshold(1));
    manager.shutdown();

    let function = Arc::clone(&module.functions[0]);
    manager.record_call(0, &function);
    assert_eq!(manager.stats().admitted, 0);
    assert_eq!(manager.call_count("step"), 0);
    assert!(manager.wait_until_idle(Duration::from_millis(100)));
}

#[test]
fn test_published_functions_survive_shutdown() {
    let module = program(3);
    let manager = manager(&module, OptimizerConfig::default().with_hot_threshold(1));
    let mut vm = VM::new().with_profiler(manager.clone());
    vm.run_entry_point(&module, &[]);
    assert!(manager.wait_until_idle(Duration::from_secs(10)));
    manager.shutdown();
    assert!(manager.optimized_function(0).is_some());
}

#[test]
fn test_stats_serialize() {
    let stats = OptimizerStats {
        admitted: 2,
        completed: 1,
        failed: 1,
        cancelled: 0,
        total_rewrites: 3,
    };
    let json = serde_json::to_value(stats).unwrap();
    assert_eq!(json["admitted"], 2);
    assert_eq!(json["total_rewrites"], 3);
    assert_eq!(
        serde_json::to_value(FunctionState::InFlight).unwrap(),
        "in_flight"
    );
}

#[test]
fn test_debug_output() {
    let module = program(1);
    let manager = manager(&module, OptimizerConfig::default());
    let text = format!("{:?}", manager);
    assert!(text.contains("OptimizationManager"));
}
