//! Built-in workloads
//!
//! Each workload is a small module assembled with the instruction builder.
//! `main` calls a worker function `calls` times, sums the results, and
//! prints the total, so output is comparable across optimized and
//! unoptimized runs.

use bytecode_system::{
    BytecodeError, BytecodeModule, CompiledFunction, InstructionBuilder, ModuleBuilder, Opcode,
    Parameter,
};
use clap::ValueEnum;
use core_types::{ElementType, ValueType};
use serde::Serialize;
use std::fmt;

/// Which program to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadKind {
    /// Count up to `iterations` with `i = i + 1`
    Counter,
    /// Count `n` down to zero with `n = n - 1`
    Countdown,
    /// Sum an `iterations`-long int array
    ArraySum,
    /// Naive recursive Fibonacci of `iterations`
    Fib,
}

impl WorkloadKind {
    /// Name of the function that gets hot
    pub fn worker_name(self) -> &'static str {
        match self {
            WorkloadKind::Counter => "count_to",
            WorkloadKind::Countdown => "countdown",
            WorkloadKind::ArraySum => "sum",
            WorkloadKind::Fib => "fib",
        }
    }

    /// Default number of calls from `main`
    pub fn default_calls(self) -> u32 {
        match self {
            WorkloadKind::Fib => 10,
            _ => 1500,
        }
    }

    /// Default loop length or Fibonacci argument
    pub fn default_iterations(self) -> u32 {
        match self {
            WorkloadKind::Counter | WorkloadKind::Countdown => 1000,
            WorkloadKind::ArraySum => 256,
            WorkloadKind::Fib => 20,
        }
    }

    /// Value `main` prints for these parameters
    pub fn expected_total(self, calls: u32, iterations: u32) -> i64 {
        let calls = i64::from(calls);
        let n = i64::from(iterations);
        match self {
            WorkloadKind::Counter | WorkloadKind::Countdown => calls.wrapping_mul(n),
            WorkloadKind::ArraySum => {
                // n * (n - 1) leaves i64 near u32::MAX; the halved sum fits
                let sum = (i128::from(n) * i128::from(n - 1) / 2) as i64;
                calls.wrapping_mul(sum)
            }
            WorkloadKind::Fib => {
                let (mut a, mut b) = (0i64, 1i64);
                for _ in 0..n {
                    let next = a.wrapping_add(b);
                    a = b;
                    b = next;
                }
                calls.wrapping_mul(a)
            }
        }
    }

    /// Assemble the module
    pub fn build(self, calls: u32, iterations: u32) -> Result<BytecodeModule, BytecodeError> {
        let mut module = ModuleBuilder::new();
        let k = Constants {
            zero: module.add_int_constant(0) as i64,
            one: module.add_int_constant(1) as i64,
            two: module.add_int_constant(2) as i64,
            calls: module.add_int_constant(i64::from(calls)) as i64,
            iterations: module.add_int_constant(i64::from(iterations)) as i64,
        };
        // main is added last, so the worker is function 0
        let worker = module.next_function_index() as i64;
        let function = match self {
            WorkloadKind::Counter => count_to(&k)?,
            WorkloadKind::Countdown => countdown(&k)?,
            WorkloadKind::ArraySum => sum(&k)?,
            WorkloadKind::Fib => fib(&k, worker)?,
        };
        module.add_function(function);
        let main = match self {
            WorkloadKind::ArraySum => array_main(&k, worker)?,
            _ => scalar_main(&k, worker)?,
        };
        module.add_function(main);
        module.entry_point("main");
        Ok(module.build())
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkloadKind::Counter => "counter",
            WorkloadKind::Countdown => "countdown",
            WorkloadKind::ArraySum => "array-sum",
            WorkloadKind::Fib => "fib",
        })
    }
}

/// Constant-table indices shared by every function
struct Constants {
    zero: i64,
    one: i64,
    two: i64,
    calls: i64,
    iterations: i64,
}

fn int(name: &str) -> Parameter {
    Parameter::new(name, ValueType::Int)
}

/// `local = local + 1`, the shape the optimizer fuses
fn emit_increment(code: &mut InstructionBuilder, k: &Constants, local: i64) {
    code.emit(Opcode::LoadLocal, local)
        .emit(Opcode::PushInt, k.one)
        .emit(Opcode::AddInt, 0)
        .emit(Opcode::StoreLocal, local);
}

/// Emit a jump to an already emitted address
fn emit_jump_back(code: &mut InstructionBuilder, target: usize) {
    let offset = target as i64 - code.current_address() as i64;
    code.emit(Opcode::Jump, offset);
}

/// Point a forward jump at the next instruction to be emitted
fn patch_to_here(code: &mut InstructionBuilder, jump: usize) -> Result<(), BytecodeError> {
    let offset = code.current_address() as i64 - jump as i64;
    code.patch_operand(jump, offset)
}

/// `counter = 0; while counter < bound { body; counter += 1 }`
fn emit_counted_loop(
    code: &mut InstructionBuilder,
    k: &Constants,
    counter: i64,
    bound: impl Fn(&mut InstructionBuilder),
    body: impl FnOnce(&mut InstructionBuilder),
) -> Result<(), BytecodeError> {
    code.emit(Opcode::PushInt, k.zero)
        .emit(Opcode::StoreLocal, counter);
    let head = code.current_address();
    code.emit(Opcode::LoadLocal, counter);
    bound(code);
    code.emit(Opcode::LtInt, 0);
    let exit = code.current_address();
    code.emit(Opcode::JumpIfFalse, 0);
    body(code);
    emit_increment(code, k, counter);
    emit_jump_back(code, head);
    patch_to_here(code, exit)
}

/// `count_to(n) -> int`: loops `n` times and returns the count
fn count_to(k: &Constants) -> Result<CompiledFunction, BytecodeError> {
    let mut code = InstructionBuilder::new();
    emit_counted_loop(
        &mut code,
        k,
        1,
        |code| {
            code.emit(Opcode::LoadLocal, 0);
        },
        |_| {},
    )?;
    code.emit(Opcode::LoadLocal, 1).emit(Opcode::Return, 0);
    Ok(CompiledFunction::new(
        "count_to",
        vec![int("n")],
        ValueType::Int,
        2,
        code.build(),
    ))
}

/// `countdown(n) -> int`: decrements `n` to zero, counting the steps
fn countdown(k: &Constants) -> Result<CompiledFunction, BytecodeError> {
    let mut code = InstructionBuilder::new();
    code.emit(Opcode::PushInt, k.zero).emit(Opcode::StoreLocal, 1);
    let head = code.current_address();
    code.emit(Opcode::LoadLocal, 0)
        .emit(Opcode::PushInt, k.zero)
        .emit(Opcode::GtInt, 0);
    let exit = code.current_address();
    code.emit(Opcode::JumpIfFalse, 0)
        .emit(Opcode::LoadLocal, 0)
        .emit(Opcode::PushInt, k.one)
        .emit(Opcode::SubInt, 0)
        .emit(Opcode::StoreLocal, 0);
    emit_increment(&mut code, k, 1);
    emit_jump_back(&mut code, head);
    patch_to_here(&mut code, exit)?;
    code.emit(Opcode::LoadLocal, 1).emit(Opcode::Return, 0);
    Ok(CompiledFunction::new(
        "countdown",
        vec![int("n")],
        ValueType::Int,
        2,
        code.build(),
    ))
}

/// `sum(xs: int[]) -> int`
fn sum(k: &Constants) -> Result<CompiledFunction, BytecodeError> {
    let mut code = InstructionBuilder::new();
    code.emit(Opcode::PushInt, k.zero).emit(Opcode::StoreLocal, 2);
    emit_counted_loop(
        &mut code,
        k,
        1,
        |code| {
            code.emit(Opcode::LoadLocal, 0).emit(Opcode::ArrayLength, 0);
        },
        |code| {
            code.emit(Opcode::LoadLocal, 2)
                .emit(Opcode::LoadLocal, 0)
                .emit(Opcode::LoadLocal, 1)
                .emit(Opcode::ArrayLoad, 0)
                .emit(Opcode::AddInt, 0)
                .emit(Opcode::StoreLocal, 2);
        },
    )?;
    code.emit(Opcode::LoadLocal, 2).emit(Opcode::Return, 0);
    Ok(CompiledFunction::new(
        "sum",
        vec![Parameter::new("xs", ValueType::Array(ElementType::Int))],
        ValueType::Int,
        3,
        code.build(),
    ))
}

/// `fib(n) -> int`, recursive; nothing in it fuses
fn fib(k: &Constants, index: i64) -> Result<CompiledFunction, BytecodeError> {
    let mut code = InstructionBuilder::new();
    code.emit(Opcode::LoadLocal, 0)
        .emit(Opcode::PushInt, k.two)
        .emit(Opcode::LtInt, 0);
    let recurse = code.current_address();
    code.emit(Opcode::JumpIfFalse, 0)
        .emit(Opcode::LoadLocal, 0)
        .emit(Opcode::Return, 0);
    patch_to_here(&mut code, recurse)?;
    code.emit(Opcode::LoadLocal, 0)
        .emit(Opcode::PushInt, k.one)
        .emit(Opcode::SubInt, 0)
        .emit(Opcode::Call, index)
        .emit(Opcode::LoadLocal, 0)
        .emit(Opcode::PushInt, k.two)
        .emit(Opcode::SubInt, 0)
        .emit(Opcode::Call, index)
        .emit(Opcode::AddInt, 0)
        .emit(Opcode::Return, 0);
    Ok(CompiledFunction::new(
        "fib",
        vec![int("n")],
        ValueType::Int,
        1,
        code.build(),
    ))
}

/// `main()`: total += worker(iterations), `calls` times; print total
fn scalar_main(k: &Constants, worker: i64) -> Result<CompiledFunction, BytecodeError> {
    let mut code = InstructionBuilder::new();
    code.emit(Opcode::PushInt, k.zero).emit(Opcode::StoreLocal, 1);
    emit_counted_loop(
        &mut code,
        k,
        0,
        |code| {
            code.emit(Opcode::PushInt, k.calls);
        },
        |code| {
            code.emit(Opcode::LoadLocal, 1)
                .emit(Opcode::PushInt, k.iterations)
                .emit(Opcode::Call, worker)
                .emit(Opcode::AddInt, 0)
                .emit(Opcode::StoreLocal, 1);
        },
    )?;
    code.emit(Opcode::LoadLocal, 1)
        .emit(Opcode::Print, 0)
        .emit(Opcode::ReturnVoid, 0);
    Ok(CompiledFunction::new("main", vec![], ValueType::Void, 2, code.build()))
}

/// `main()`: fill `xs[i] = i`, then total += sum(xs), `calls` times
fn array_main(k: &Constants, worker: i64) -> Result<CompiledFunction, BytecodeError> {
    let mut code = InstructionBuilder::new();
    code.emit(Opcode::PushInt, k.iterations)
        .emit(Opcode::NewArray, i64::from(ElementType::Int.tag()))
        .emit(Opcode::StoreLocal, 0);
    emit_counted_loop(
        &mut code,
        k,
        1,
        |code| {
            code.emit(Opcode::PushInt, k.iterations);
        },
        |code| {
            code.emit(Opcode::LoadLocal, 0)
                .emit(Opcode::LoadLocal, 1)
                .emit(Opcode::LoadLocal, 1)
                .emit(Opcode::ArrayStore, 0);
        },
    )?;
    code.emit(Opcode::PushInt, k.zero).emit(Opcode::StoreLocal, 3);
    emit_counted_loop(
        &mut code,
        k,
        2,
        |code| {
            code.emit(Opcode::PushInt, k.calls);
        },
        |code| {
            code.emit(Opcode::LoadLocal, 3)
                .emit(Opcode::LoadLocal, 0)
                .emit(Opcode::Call, worker)
                .emit(Opcode::AddInt, 0)
                .emit(Opcode::StoreLocal, 3);
        },
    )?;
    code.emit(Opcode::LoadLocal, 3)
        .emit(Opcode::Print, 0)
        .emit(Opcode::ReturnVoid, 0);
    Ok(CompiledFunction::new("main", vec![], ValueType::Void, 4, code.build()))
}
