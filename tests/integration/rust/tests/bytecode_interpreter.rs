//! Bytecode System and Interpreter Integration Tests
//!
//! Builds modules with the bytecode_system builders and executes them,
//! before and after pattern optimization.

use bytecode_system::{
    BytecodeModule, CompiledFunction, InstructionBuilder, ModuleBuilder, Opcode, Parameter,
    PatternOptimizer,
};
use core_types::{HostValue, ValueType, VmResult};
use integration_tests::fixtures::{counting_module, COUNT_INDEX};
use interpreter::VM;
use std::sync::Arc;

/// Replace one function of a module
fn with_function(module: &BytecodeModule, index: usize, function: CompiledFunction) -> BytecodeModule {
    let mut replaced = module.clone();
    replaced.functions[index] = Arc::new(function);
    replaced
}

/// Test: optimized bytecode gives identical results through the interpreter
#[test]
fn test_optimized_function_same_result() {
    let module = counting_module(37, 1);
    let outcome = PatternOptimizer::new(&module)
        .optimize(&module.functions[COUNT_INDEX])
        .unwrap();
    assert_eq!(outcome.rewrites, 1);
    let optimized = with_function(&module, COUNT_INDEX, outcome.function);

    let mut vm = VM::new();
    let args = [HostValue::Int(37)];
    let plain = vm.call_function(&module, "count", &args);
    let fused = vm.call_function(&optimized, "count", &args);
    assert_eq!(plain, (VmResult::Success, Some(HostValue::Int(37))));
    assert_eq!(fused, plain);
}

/// Test: decrement fusion inside a countdown loop with a forward jump
#[test]
fn test_decrement_fusion_preserves_control_flow() {
    let mut builder = ModuleBuilder::new();
    let zero = builder.add_int_constant(0) as i64;
    let one = builder.add_int_constant(1) as i64;
    let mut code = InstructionBuilder::new();
    code.emit(Opcode::LoadLocal, 0) // 0  loop
        .emit(Opcode::PushInt, zero) // 1
        .emit(Opcode::GtInt, 0) // 2
        .emit(Opcode::JumpIfFalse, 8) // 3 -> 11
        .emit(Opcode::LoadLocal, 0) // 4
        .emit(Opcode::Print, 0) // 5
        .emit(Opcode::LoadLocal, 0) // 6
        .emit(Opcode::PushInt, one) // 7
        .emit(Opcode::SubInt, 0) // 8
        .emit(Opcode::StoreLocal, 0) // 9
        .emit(Opcode::Jump, -10) // 10 -> 0
        .emit(Opcode::ReturnVoid, 0); // 11

    builder.add_function(CompiledFunction::new(
        "down",
        vec![Parameter::new("n", ValueType::Int)],
        ValueType::Void,
        1,
        code.build(),
    ));
    let module = builder.build();

    let outcome = PatternOptimizer::new(&module)
        .optimize(&module.functions[0])
        .unwrap();
    assert_eq!(outcome.rewrites, 1);
    let optimized = with_function(&module, 0, outcome.function);

    let mut plain_vm = VM::new();
    let mut fused_vm = VM::new();
    let args = [HostValue::Int(3)];
    assert_eq!(plain_vm.call_function(&module, "down", &args).0, VmResult::Success);
    assert_eq!(fused_vm.call_function(&optimized, "down", &args).0, VmResult::Success);
    assert_eq!(plain_vm.output(), ["3", "2", "1"]);
    assert_eq!(fused_vm.output(), plain_vm.output());
}

/// Test: division by zero halts, keeping only earlier effects
#[test]
fn test_division_by_zero_halts_execution() {
    let mut builder = ModuleBuilder::new();
    let seven = builder.add_int_constant(7) as i64;
    let zero = builder.add_int_constant(0) as i64;
    let mut code = InstructionBuilder::new();
    code.emit(Opcode::PushInt, seven)
        .emit(Opcode::Print, 0)
        .emit(Opcode::PushInt, seven)
        .emit(Opcode::PushInt, zero)
        .emit(Opcode::DivInt, 0)
        .emit(Opcode::Print, 0)
        .emit(Opcode::ReturnVoid, 0);
    builder.add_function(CompiledFunction::new("main", vec![], ValueType::Void, 0, code.build()));
    let module = builder.build();

    let mut vm = VM::new();
    let (code, value) = vm.run_entry_point(&module, &[]);
    assert_eq!(code, VmResult::DivisionByZero);
    assert_eq!(value, None);
    assert_eq!(vm.output(), ["7"]);
    assert_eq!(vm.call_stack_depth(), 0);
}

/// Test: the listing shows fused instructions and remapped jumps
#[test]
fn test_disassembly_after_optimization() {
    let module = counting_module(2, 1);
    let outcome = PatternOptimizer::new(&module)
        .optimize(&module.functions[COUNT_INDEX])
        .unwrap();
    let listing = outcome.function.disassemble(Some(&module));
    assert!(listing.contains("INC_LOCAL 1"));
    assert!(listing.contains("JUMP -5"));
    assert!(!listing.contains("ADD_INT"));
}
