//! Integration tests for interpreter
//!
//! Tests calls across functions, limits, host values and the profiling hook

use bytecode_system::{
    BytecodeModule, CompiledFunction, InstructionBuilder, ModuleBuilder, Opcode, Parameter,
};
use core_types::{ElementType, HostValue, ValueType, VmResult};
use interpreter::{CallProfiler, VmConfig, VM};
use parking_lot::Mutex;
use std::sync::Arc;

fn int_param(name: &str) -> Parameter {
    Parameter::new(name, ValueType::Int)
}

/// fact(n) = n <= 1 ? 1 : n * fact(n - 1)
fn factorial_module() -> BytecodeModule {
    let mut module = ModuleBuilder::new();
    let one = module.add_int_constant(1) as i64;
    let mut code = InstructionBuilder::new();
    code.emit(Opcode::LoadLocal, 0) // 0
        .emit(Opcode::PushInt, one) // 1
        .emit(Opcode::LeInt, 0) // 2
        .emit(Opcode::JumpIfFalse, 3) // 3 -> 6
        .emit(Opcode::PushInt, one) // 4
        .emit(Opcode::Return, 0) // 5
        .emit(Opcode::LoadLocal, 0) // 6
        .emit(Opcode::LoadLocal, 0) // 7
        .emit(Opcode::PushInt, one) // 8
        .emit(Opcode::SubInt, 0) // 9
        .emit(Opcode::Call, 0) // 10
        .emit(Opcode::MulInt, 0) // 11
        .emit(Opcode::Return, 0); // 12
    module.add_function(CompiledFunction::new(
        "fact",
        vec![int_param("n")],
        ValueType::Int,
        1,
        code.build(),
    ));
    module.build()
}

#[test]
fn test_recursive_factorial() {
    let mut vm = VM::new();
    let (result, value) = vm.run_entry_point(&factorial_module(), &[HostValue::Int(10)]);
    assert_eq!(result, VmResult::Success);
    assert_eq!(value, Some(HostValue::Int(3_628_800)));
    assert_eq!(vm.stats().max_depth, 10);
    assert_eq!(vm.call_stack_depth(), 0);
}

#[test]
fn test_arguments_bind_in_order() {
    let mut module = ModuleBuilder::new();
    let ten = module.add_int_constant(10) as i64;
    let three = module.add_int_constant(3) as i64;

    let mut sub = InstructionBuilder::new();
    sub.emit(Opcode::LoadLocal, 0)
        .emit(Opcode::LoadLocal, 1)
        .emit(Opcode::SubInt, 0)
        .emit(Opcode::Return, 0);
    let mut main = InstructionBuilder::new();
    main.emit(Opcode::PushInt, ten)
        .emit(Opcode::PushInt, three)
        .emit(Opcode::Call, 1)
        .emit(Opcode::Return, 0);

    module.add_function(CompiledFunction::new("main", vec![], ValueType::Int, 0, main.build()));
    module.add_function(CompiledFunction::new(
        "sub",
        vec![int_param("a"), int_param("b")],
        ValueType::Int,
        2,
        sub.build(),
    ));

    let mut vm = VM::new();
    assert_eq!(
        vm.run_entry_point(&module.build(), &[]),
        (VmResult::Success, Some(HostValue::Int(7)))
    );
}

#[test]
fn test_void_call_pushes_nothing() {
    let mut module = ModuleBuilder::new();
    let five = module.add_int_constant(5) as i64;
    let mut noop = InstructionBuilder::new();
    noop.emit(Opcode::ReturnVoid, 0);
    let mut main = InstructionBuilder::new();
    main.emit(Opcode::PushInt, five)
        .emit(Opcode::Call, 1)
        .emit(Opcode::Call, 1)
        .emit(Opcode::Return, 0);
    module.add_function(CompiledFunction::new("main", vec![], ValueType::Int, 0, main.build()));
    module.add_function(CompiledFunction::new("noop", vec![], ValueType::Void, 0, noop.build()));

    let mut vm = VM::new();
    assert_eq!(
        vm.run_entry_point(&module.build(), &[]),
        (VmResult::Success, Some(HostValue::Int(5)))
    );
}

#[test]
fn test_callee_cannot_pop_caller_operands() {
    let mut module = ModuleBuilder::new();
    let five = module.add_int_constant(5) as i64;
    let mut greedy = InstructionBuilder::new();
    greedy.emit(Opcode::Pop, 0);
    let mut main = InstructionBuilder::new();
    main.emit(Opcode::PushInt, five).emit(Opcode::Call, 1);
    module.add_function(CompiledFunction::new("main", vec![], ValueType::Void, 0, main.build()));
    module.add_function(CompiledFunction::new("greedy", vec![], ValueType::Void, 0, greedy.build()));

    let mut vm = VM::new();
    assert_eq!(vm.run_entry_point(&module.build(), &[]).0, VmResult::StackUnderflow);
}

#[test]
fn test_invalid_function_index() {
    let mut module = ModuleBuilder::new();
    let mut main = InstructionBuilder::new();
    main.emit(Opcode::Call, 4);
    module.add_function(CompiledFunction::new("main", vec![], ValueType::Void, 0, main.build()));
    let mut vm = VM::new();
    assert_eq!(
        vm.run_entry_point(&module.build(), &[]).0,
        VmResult::InvalidFunctionIndex
    );
}

#[test]
fn test_call_depth_limit() {
    let mut module = ModuleBuilder::new();
    let mut forever = InstructionBuilder::new();
    forever.emit(Opcode::Call, 0);
    module.add_function(CompiledFunction::new("forever", vec![], ValueType::Void, 0, forever.build()));

    let mut vm = VM::with_config(VmConfig::default().with_max_call_depth(16));
    assert_eq!(
        vm.run_entry_point(&module.build(), &[]).0,
        VmResult::CallStackOverflow
    );
    assert_eq!(vm.stats().max_depth, 16);
    assert_eq!(vm.call_stack_depth(), 0);
}

#[test]
fn test_stack_size_limit() {
    let mut module = ModuleBuilder::new();
    let mut main = InstructionBuilder::new();
    for _ in 0..5 {
        main.emit(Opcode::PushTrue, 0);
    }
    module.add_function(CompiledFunction::new("main", vec![], ValueType::Void, 0, main.build()));

    let mut vm = VM::with_config(VmConfig::default().with_max_stack_size(4));
    assert_eq!(vm.run_entry_point(&module.build(), &[]).0, VmResult::StackOverflow);
}

/// sum(xs) adds every element of an int array
fn array_sum_module() -> BytecodeModule {
    let mut module = ModuleBuilder::new();
    let zero = module.add_int_constant(0) as i64;
    let mut code = InstructionBuilder::new();
    // locals: 0 = xs, 1 = i, 2 = acc
    code.emit(Opcode::PushInt, zero)
        .emit(Opcode::StoreLocal, 1)
        .emit(Opcode::PushInt, zero)
        .emit(Opcode::StoreLocal, 2);
    let head = code.current_address();
    code.emit(Opcode::LoadLocal, 1)
        .emit(Opcode::LoadLocal, 0)
        .emit(Opcode::ArrayLength, 0)
        .emit(Opcode::LtInt, 0);
    let exit = code.current_address();
    code.emit(Opcode::JumpIfFalse, 0)
        .emit(Opcode::LoadLocal, 2)
        .emit(Opcode::LoadLocal, 0)
        .emit(Opcode::LoadLocal, 1)
        .emit(Opcode::ArrayLoad, 0)
        .emit(Opcode::AddInt, 0)
        .emit(Opcode::StoreLocal, 2)
        .emit(Opcode::IncLocal, 1);
    let back = code.current_address();
    code.emit(Opcode::Jump, head as i64 - back as i64);
    let end = code.current_address();
    code.patch_operand(exit, (end - exit) as i64).unwrap();
    code.emit(Opcode::LoadLocal, 2).emit(Opcode::Return, 0);

    module.add_function(CompiledFunction::new(
        "sum",
        vec![Parameter::new("xs", ValueType::Array(ElementType::Int))],
        ValueType::Int,
        3,
        code.build(),
    ));
    module.build()
}

#[test]
fn test_host_array_argument() {
    let mut vm = VM::new();
    let (result, value) =
        vm.run_entry_point(&array_sum_module(), &[HostValue::IntArray(vec![1, 2, 3, 4])]);
    assert_eq!(result, VmResult::Success);
    assert_eq!(value, Some(HostValue::Int(10)));
    assert_eq!(vm.heap_stats().live_count, 0);
    assert_eq!(vm.heap_stats().total_frees, 1);
}

#[test]
fn test_array_shared_across_frames() {
    // fill(xs) stores 9 at xs[0]; main allocates, calls fill, then reads back
    let mut module = ModuleBuilder::new();
    let zero = module.add_int_constant(0) as i64;
    let one = module.add_int_constant(1) as i64;
    let nine = module.add_int_constant(9) as i64;

    let mut main = InstructionBuilder::new();
    main.emit(Opcode::PushInt, one)
        .emit(Opcode::NewArray, ElementType::Int.tag() as i64)
        .emit(Opcode::StoreLocal, 0)
        .emit(Opcode::LoadLocal, 0)
        .emit(Opcode::Call, 1)
        .emit(Opcode::LoadLocal, 0)
        .emit(Opcode::PushInt, zero)
        .emit(Opcode::ArrayLoad, 0)
        .emit(Opcode::Return, 0);
    let mut fill = InstructionBuilder::new();
    fill.emit(Opcode::LoadLocal, 0)
        .emit(Opcode::PushInt, zero)
        .emit(Opcode::PushInt, nine)
        .emit(Opcode::ArrayStore, 0)
        .emit(Opcode::ReturnVoid, 0);

    module.add_function(CompiledFunction::new("main", vec![], ValueType::Int, 1, main.build()));
    module.add_function(CompiledFunction::new(
        "fill",
        vec![Parameter::new("xs", ValueType::Array(ElementType::Int))],
        ValueType::Void,
        1,
        fill.build(),
    ));

    let mut vm = VM::new();
    assert_eq!(
        vm.run_entry_point(&module.build(), &[]),
        (VmResult::Success, Some(HostValue::Int(9)))
    );
    assert_eq!(vm.heap_stats().live_count, 0);
}

// ============================================================================
// Profiling hook
// ============================================================================

/// Records calls and serves replacements installed by the test
#[derive(Default)]
struct RecordingProfiler {
    calls: Mutex<Vec<usize>>,
    replacements: Mutex<Vec<(usize, Arc<CompiledFunction>)>>,
    /// Installed on the first recorded call
    pending: Mutex<Option<(usize, Arc<CompiledFunction>)>>,
}

impl CallProfiler for RecordingProfiler {
    fn record_call(&self, function_index: usize, _function: &CompiledFunction) {
        self.calls.lock().push(function_index);
        if let Some(replacement) = self.pending.lock().take() {
            self.replacements.lock().push(replacement);
        }
    }

    fn optimized_function(&self, function_index: usize) -> Option<Arc<CompiledFunction>> {
        self.replacements
            .lock()
            .iter()
            .find(|(index, _)| *index == function_index)
            .map(|(_, function)| Arc::clone(function))
    }
}

/// main prints `marker` after calling helper once; helper returns void
fn marker_module(marker: i64) -> (BytecodeModule, CompiledFunction) {
    let mut module = ModuleBuilder::new();
    let k = module.add_int_constant(marker) as i64;
    let alt = module.add_int_constant(999) as i64;

    let mut main = InstructionBuilder::new();
    main.emit(Opcode::Call, 1)
        .emit(Opcode::PushInt, k)
        .emit(Opcode::Print, 0)
        .emit(Opcode::ReturnVoid, 0);
    let mut helper = InstructionBuilder::new();
    helper.emit(Opcode::ReturnVoid, 0);
    let main = CompiledFunction::new("main", vec![], ValueType::Void, 0, main.build());

    let mut replacement = InstructionBuilder::new();
    replacement
        .emit(Opcode::PushInt, alt)
        .emit(Opcode::Print, 0)
        .emit(Opcode::ReturnVoid, 0);
    let replacement = main.with_instructions(replacement.build());

    module.add_function(main);
    module.add_function(CompiledFunction::new("helper", vec![], ValueType::Void, 0, helper.build()));
    (module.build(), replacement)
}

#[test]
fn test_profiler_sees_every_call() {
    let profiler = Arc::new(RecordingProfiler::default());
    let mut vm = VM::new().with_profiler(profiler.clone());
    let (result, _) = vm.run_entry_point(&factorial_module(), &[HostValue::Int(5)]);
    assert_eq!(result, VmResult::Success);
    // the entry invocation is not a CALL instruction
    assert_eq!(*profiler.calls.lock(), vec![0, 0, 0, 0]);
}

#[test]
fn test_running_frame_keeps_its_version() {
    let (module, replacement) = marker_module(7);
    let profiler = Arc::new(RecordingProfiler::default());
    *profiler.pending.lock() = Some((0, Arc::new(replacement)));
    let mut vm = VM::new().with_profiler(profiler.clone());

    // published while main is running; main still finishes the original code
    assert_eq!(vm.run_entry_point(&module, &[]).0, VmResult::Success);
    assert_eq!(vm.take_output(), vec!["7"]);

    // the next invocation prefers the published version
    assert_eq!(vm.run_entry_point(&module, &[]).0, VmResult::Success);
    assert_eq!(vm.take_output(), vec!["999"]);
}
