//! Virtual Machine for bytecode execution
//!
//! Main entry point for executing bytecode modules.

use bytecode_system::{BytecodeModule, CompiledFunction};
use core_types::{HostValue, Value, VmError, VmOutcome, VmResult};
use memory_manager::HeapStats;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::config::VmConfig;
use crate::dispatch::{Dispatcher, ExecutionStats};
use crate::profile::CallProfiler;

/// Virtual Machine for executing bytecode
///
/// The VM manages the execution state including:
/// - Call stack for function invocations
/// - Operand stack and array heap (via memory_manager)
/// - The program's printed output
/// - An optional call profiler feeding the optimizing tier
pub struct VM {
    /// Dispatcher for bytecode execution
    dispatcher: Dispatcher,
    /// Receives call notifications and supplies optimized functions
    profiler: Option<Arc<dyn CallProfiler>>,
}

impl fmt::Debug for VM {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VM")
            .field("dispatcher", &self.dispatcher)
            .field("has_profiler", &self.profiler.is_some())
            .finish()
    }
}

impl VM {
    /// Create a new VM with default limits and no profiler
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Create a new VM with explicit limits
    pub fn with_config(config: VmConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(config),
            profiler: None,
        }
    }

    /// Attach a call profiler
    pub fn with_profiler(mut self, profiler: Arc<dyn CallProfiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// Replace or remove the call profiler
    pub fn set_profiler(&mut self, profiler: Option<Arc<dyn CallProfiler>>) {
        self.profiler = profiler;
    }

    /// Execute the module's entry point
    ///
    /// Returns the result code and, on success, the returned value (if the
    /// entry function returns one).
    ///
    /// # Example
    ///
    /// ```
    /// use bytecode_system::{CompiledFunction, InstructionBuilder, ModuleBuilder, Opcode};
    /// use core_types::{HostValue, ValueType, VmResult};
    /// use interpreter::VM;
    ///
    /// let mut module = ModuleBuilder::new();
    /// let k = module.add_int_constant(42);
    /// let mut code = InstructionBuilder::new();
    /// code.emit(Opcode::PushInt, k as i64).emit(Opcode::Return, 0);
    /// module.add_function(CompiledFunction::new("main", vec![], ValueType::Int, 0, code.build()));
    ///
    /// let mut vm = VM::new();
    /// let (code, value) = vm.run_entry_point(&module.build(), &[]);
    /// assert_eq!(code, VmResult::Success);
    /// assert_eq!(value, Some(HostValue::Int(42)));
    /// ```
    pub fn run_entry_point(
        &mut self,
        module: &BytecodeModule,
        args: &[HostValue],
    ) -> (VmResult, Option<HostValue>) {
        let name = module.entry_point.clone();
        self.call_function(module, &name, args)
    }

    /// Execute any function of the module by name
    pub fn call_function(
        &mut self,
        module: &BytecodeModule,
        name: &str,
        args: &[HostValue],
    ) -> (VmResult, Option<HostValue>) {
        let result = self.try_call_function(module, name, args);
        match result {
            Ok(value) => {
                debug!(function = name, "execution finished");
                (VmResult::Success, value)
            }
            Err(err) => {
                debug!(function = name, error = %err, "execution failed");
                (err.code(), None)
            }
        }
    }

    /// Execute a function by name, reporting faults as `VmError`
    ///
    /// An unknown name reports `InvalidFunctionIndex` with the size of the
    /// function table.
    pub fn try_call_function(
        &mut self,
        module: &BytecodeModule,
        name: &str,
        args: &[HostValue],
    ) -> VmOutcome<Option<HostValue>> {
        let index = module
            .function_index(name)
            .ok_or(VmError::InvalidFunctionIndex(module.functions.len()))?;
        let function = module
            .function(index)
            .ok_or(VmError::InvalidFunctionIndex(index))?;
        check_arguments(function, args)?;

        let heap = self.dispatcher.heap_mut();
        let values: Vec<Value> = args.iter().map(|arg| heap.import(arg)).collect();
        let returned = self
            .dispatcher
            .execute(module, self.profiler.as_deref(), index, values)?;
        match returned {
            Some(value) => self.dispatcher.heap_mut().export(value),
            None => Ok(None),
        }
    }

    /// Program output produced so far
    pub fn output(&self) -> &[String] {
        self.dispatcher.output()
    }

    /// Drain the program output
    pub fn take_output(&mut self) -> Vec<String> {
        self.dispatcher.take_output()
    }

    /// Heap statistics
    pub fn heap_stats(&self) -> HeapStats {
        self.dispatcher.heap().stats()
    }

    /// Execution counters accumulated across runs
    pub fn stats(&self) -> ExecutionStats {
        self.dispatcher.stats()
    }

    /// Get the current call stack depth
    pub fn call_stack_depth(&self) -> usize {
        self.dispatcher.call_depth()
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

/// Host arguments must match the declared parameters
fn check_arguments(function: &CompiledFunction, args: &[HostValue]) -> VmOutcome<()> {
    let arity = function.arity();
    if args.len() < arity {
        return Err(VmError::StackUnderflow);
    }
    if args.len() > arity {
        return Err(VmError::InvalidLocalIndex {
            index: arity,
            count: arity,
        });
    }
    for (arg, param) in args.iter().zip(&function.parameters) {
        let found = arg.value_type();
        if found != param.ty {
            return Err(VmError::InvalidValueType {
                expected: param.ty.name(),
                found: found.name(),
            });
        }
    }
    Ok(())
}
