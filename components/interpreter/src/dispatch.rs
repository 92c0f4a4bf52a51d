//! Dispatch loop for bytecode execution
//!
//! Handles individual opcode execution. The dispatcher owns all mutable
//! execution state: the array heap, the operand stack and the call-frame
//! stack. Every fallible step returns a `VmError`; the caller unwinds.

use bytecode_system::{BytecodeModule, CompiledFunction, Instruction, Opcode};
use core_types::{ElementType, Value, VmError, VmOutcome};
use memory_manager::{ArrayHeap, OperandStack};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::call_frame::CallFrame;
use crate::config::VmConfig;
use crate::profile::CallProfiler;

/// Counters collected while executing
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Instructions decoded and executed
    pub instructions_executed: u64,
    /// Frames entered, including entry frames
    pub calls: u64,
    /// Deepest call stack observed
    pub max_depth: usize,
}

/// What the loop does after a step
enum Flow {
    Continue,
    Finished(Option<Value>),
}

fn top(frames: &mut [CallFrame]) -> VmOutcome<&mut CallFrame> {
    frames.last_mut().ok_or(VmError::StackUnderflow)
}

/// Dispatch handler for executing bytecode
#[derive(Debug)]
pub struct Dispatcher {
    config: VmConfig,
    /// Arrays reachable from slots
    heap: ArrayHeap,
    /// Operand stack shared by all frames
    stack: OperandStack,
    /// Active call frames, innermost last
    frames: Vec<CallFrame>,
    /// Lines produced by `PRINT`
    output: Vec<String>,
    stats: ExecutionStats,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(config: VmConfig) -> Self {
        Self {
            config,
            heap: ArrayHeap::new(),
            stack: OperandStack::new(config.max_stack_size),
            frames: Vec::with_capacity(64),
            output: Vec::new(),
            stats: ExecutionStats::default(),
        }
    }

    /// The array heap
    pub fn heap(&self) -> &ArrayHeap {
        &self.heap
    }

    /// Mutable access to the array heap
    pub fn heap_mut(&mut self) -> &mut ArrayHeap {
        &mut self.heap
    }

    /// Program output produced so far
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Drain the program output
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Execution counters
    pub fn stats(&self) -> ExecutionStats {
        self.stats
    }

    /// Number of active call frames
    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    /// Number of operand stack entries
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Run a function to completion
    ///
    /// `args` are owned values (arrays carry one reference each) matching the
    /// callee's parameters. On a fault every frame and stack entry is
    /// released before the error is returned.
    pub fn execute(
        &mut self,
        module: &BytecodeModule,
        profiler: Option<&dyn CallProfiler>,
        function_index: usize,
        args: Vec<Value>,
    ) -> VmOutcome<Option<Value>> {
        self.unwind();
        let result = self
            .start(module, profiler, function_index, args)
            .and_then(|()| self.run(module, profiler));
        if let Err(err) = &result {
            debug!(error = %err, code = %err.code(), "execution fault");
            self.unwind();
        }
        result
    }

    fn start(
        &mut self,
        module: &BytecodeModule,
        profiler: Option<&dyn CallProfiler>,
        function_index: usize,
        args: Vec<Value>,
    ) -> VmOutcome<()> {
        if args.len() > self.stack.max_size() {
            for arg in args {
                self.heap.release_value(arg)?;
            }
            return Err(VmError::StackOverflow(self.stack.max_size()));
        }
        for arg in args {
            self.stack.push(arg)?;
        }
        let function = Self::resolve(module, profiler, function_index)?;
        self.push_frame(function_index, function, None)
    }

    /// Published replacement if any, otherwise the module's own function
    fn resolve(
        module: &BytecodeModule,
        profiler: Option<&dyn CallProfiler>,
        index: usize,
    ) -> VmOutcome<Arc<CompiledFunction>> {
        let original = module
            .function(index)
            .ok_or(VmError::InvalidFunctionIndex(index))?;
        Ok(profiler
            .and_then(|p| p.optimized_function(index))
            .unwrap_or_else(|| Arc::clone(original)))
    }

    /// Move the top `arity` stack entries into a new frame's parameters
    fn push_frame(
        &mut self,
        index: usize,
        function: Arc<CompiledFunction>,
        return_address: Option<usize>,
    ) -> VmOutcome<()> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(VmError::CallStackOverflow(self.config.max_call_depth));
        }
        let arity = function.arity();
        if self.stack.frame_depth() < arity {
            return Err(VmError::StackUnderflow);
        }

        let base = self.stack.len() - arity;
        let mut frame = CallFrame::new(function, index, return_address, base);
        for slot in (0..arity).rev() {
            let value = self.stack.pop()?;
            frame.locals.store(slot, value, &mut self.heap)?;
        }
        self.stack.set_base(base);

        trace!(
            function = %frame.function.name,
            depth = self.frames.len() + 1,
            "enter frame"
        );
        self.frames.push(frame);
        self.stats.calls += 1;
        self.stats.max_depth = self.stats.max_depth.max(self.frames.len());
        Ok(())
    }

    /// Tear down the innermost frame and hand `value` to the caller
    fn return_from_frame(&mut self, value: Option<Value>) -> VmOutcome<Flow> {
        let mut frame = self.frames.pop().ok_or(VmError::StackUnderflow)?;
        let released = frame
            .locals
            .release_all(&mut self.heap)
            .and(self.stack.truncate(frame.stack_base, &mut self.heap));
        if let Err(err) = released {
            if let Some(value) = value {
                self.heap.release_value(value)?;
            }
            return Err(err);
        }
        trace!(function = %frame.function.name, "leave frame");

        let Some(caller) = self.frames.last_mut() else {
            return Ok(Flow::Finished(value));
        };
        if let Some(address) = frame.return_address {
            caller.pc = address;
        }
        self.stack.set_base(caller.stack_base);
        if let Some(value) = value {
            self.push(value)?;
        }
        Ok(Flow::Continue)
    }

    /// Release every frame and stack entry
    fn unwind(&mut self) {
        while let Some(mut frame) = self.frames.pop() {
            if let Err(err) = frame.locals.release_all(&mut self.heap) {
                debug!(error = %err, function = %frame.function.name, "release failed during unwind");
            }
        }
        if let Err(err) = self.stack.clear(&mut self.heap) {
            debug!(error = %err, "release failed during unwind");
        }
        self.stack.set_base(0);
    }

    fn run(
        &mut self,
        module: &BytecodeModule,
        profiler: Option<&dyn CallProfiler>,
    ) -> VmOutcome<Option<Value>> {
        loop {
            let (pc, record, length) = {
                let frame = self.frames.last().ok_or(VmError::StackUnderflow)?;
                (
                    frame.pc,
                    frame.function.record_at(frame.pc),
                    frame.function.instruction_count(),
                )
            };

            // running off the end is an implicit RETURN_VOID
            let flow = match record {
                None => self.return_from_frame(None)?,
                Some(record) => {
                    let inst =
                        Instruction::decode(record, pc).map_err(|_| VmError::InvalidOpcode {
                            opcode: record[0],
                            address: pc,
                        })?;
                    self.stats.instructions_executed += 1;
                    self.step(module, profiler, inst, pc, length)?
                }
            };

            if let Flow::Finished(value) = flow {
                return Ok(value);
            }
        }
    }

    fn step(
        &mut self,
        module: &BytecodeModule,
        profiler: Option<&dyn CallProfiler>,
        inst: Instruction,
        pc: usize,
        length: usize,
    ) -> VmOutcome<Flow> {
        let mut next = pc + 1;

        match inst.opcode {
            Opcode::Nop => {}
            Opcode::Pop => self.stack.drop_top(&mut self.heap)?,
            Opcode::Dup => self.stack.dup(&mut self.heap)?,
            Opcode::Print => {
                let value = self.stack.pop()?;
                let line = self.render(value);
                self.heap.release_value(value)?;
                let line = line?;
                trace!(%line, "print");
                self.output.push(line);
            }

            Opcode::PushInt => {
                let k = inst.index();
                let n = module
                    .int_constant(k)
                    .ok_or(VmError::InvalidConstantIndex(k))?;
                self.push(Value::Int(n))?;
            }
            Opcode::PushFloat => {
                let k = inst.index();
                let n = module
                    .float_constant(k)
                    .ok_or(VmError::InvalidConstantIndex(k))?;
                self.push(Value::Float(n))?;
            }
            Opcode::PushTrue => self.push(Value::Bool(true))?,
            Opcode::PushFalse => self.push(Value::Bool(false))?,

            Opcode::LoadLocal => {
                let value = top(&mut self.frames)?
                    .locals
                    .load(inst.index(), &mut self.heap)?;
                self.push(value)?;
            }
            Opcode::StoreLocal => {
                let value = self.stack.pop()?;
                top(&mut self.frames)?
                    .locals
                    .store(inst.index(), value, &mut self.heap)?;
            }
            Opcode::IncLocal => self.add_to_local(inst.index(), 1)?,
            Opcode::DecLocal => self.add_to_local(inst.index(), -1)?,

            Opcode::AddInt => self.binary_int(i64::wrapping_add)?,
            Opcode::SubInt => self.binary_int(i64::wrapping_sub)?,
            Opcode::MulInt => self.binary_int(i64::wrapping_mul)?,
            Opcode::DivInt => {
                self.check_int_divisor()?;
                self.binary_int(i64::wrapping_div)?
            }
            Opcode::ModInt => {
                self.check_int_divisor()?;
                self.binary_int(i64::wrapping_rem)?
            }
            Opcode::NegInt => {
                let n = self.pop_int()?;
                self.push(Value::Int(n.wrapping_neg()))?;
            }

            Opcode::AddFloat => self.binary_float(|a, b| a + b)?,
            Opcode::SubFloat => self.binary_float(|a, b| a - b)?,
            Opcode::MulFloat => self.binary_float(|a, b| a * b)?,
            Opcode::DivFloat => {
                self.check_float_divisor()?;
                self.binary_float(|a, b| a / b)?
            }
            Opcode::NegFloat => {
                let n = self.pop_float()?;
                self.push(Value::Float(-n))?;
            }

            Opcode::IntToFloat => {
                let n = self.pop_int()?;
                self.push(Value::Float(n as f64))?;
            }
            // saturating; NaN becomes 0
            Opcode::FloatToInt => {
                let n = self.pop_float()?;
                self.push(Value::Int(n as i64))?;
            }
            Opcode::Not => {
                let b = self.pop_bool()?;
                self.push(Value::Bool(!b))?;
            }

            Opcode::EqInt => self.compare_int(|a, b| a == b)?,
            Opcode::NeInt => self.compare_int(|a, b| a != b)?,
            Opcode::LtInt => self.compare_int(|a, b| a < b)?,
            Opcode::LeInt => self.compare_int(|a, b| a <= b)?,
            Opcode::GtInt => self.compare_int(|a, b| a > b)?,
            Opcode::GeInt => self.compare_int(|a, b| a >= b)?,
            Opcode::EqFloat => self.compare_float(|a, b| a == b)?,
            Opcode::NeFloat => self.compare_float(|a, b| a != b)?,
            Opcode::LtFloat => self.compare_float(|a, b| a < b)?,
            Opcode::LeFloat => self.compare_float(|a, b| a <= b)?,
            Opcode::GtFloat => self.compare_float(|a, b| a > b)?,
            Opcode::GeFloat => self.compare_float(|a, b| a >= b)?,

            Opcode::Jump => next = Self::jump_target(inst, pc, length)?,
            Opcode::JumpIfTrue => {
                if self.pop_bool()? {
                    next = Self::jump_target(inst, pc, length)?;
                }
            }
            Opcode::JumpIfFalse => {
                if !self.pop_bool()? {
                    next = Self::jump_target(inst, pc, length)?;
                }
            }

            Opcode::NewArray => {
                let tag = inst.operand;
                let element_type = ElementType::from_tag(tag).ok_or_else(|| {
                    VmError::InvalidArrayType(format!("unknown element type tag {}", tag))
                })?;
                let requested = self.pop_int()?;
                let length = usize::try_from(requested).map_err(|_| {
                    VmError::ArrayIndexOutOfBounds {
                        index: requested,
                        length: 0,
                    }
                })?;
                if length > self.config.max_array_length {
                    return Err(VmError::ArrayIndexOutOfBounds {
                        index: requested,
                        length: self.config.max_array_length,
                    });
                }
                let id = self.heap.allocate(element_type, length);
                self.push(Value::Array(id))?;
            }
            Opcode::ArrayLoad => {
                let index = self.pop_int()?;
                let id = self.pop_array()?;
                let element = self.heap.load(id, index);
                self.heap.release(id)?;
                self.push(element?)?;
            }
            Opcode::ArrayStore => {
                let value = self.stack.pop()?;
                let stored = self.store_element(value);
                if stored.is_err() {
                    self.heap.release_value(value)?;
                }
                stored?;
            }
            Opcode::ArrayLength => {
                let id = self.pop_array()?;
                let length = self.heap.length(id);
                self.heap.release(id)?;
                self.push(Value::Int(length? as i64))?;
            }

            Opcode::Call => {
                let index = inst.index();
                let original = module
                    .function(index)
                    .ok_or(VmError::InvalidFunctionIndex(index))?;
                if let Some(profiler) = profiler {
                    profiler.record_call(index, original);
                }
                let function = Self::resolve(module, profiler, index)?;
                self.push_frame(index, function, Some(pc + 1))?;
                return Ok(Flow::Continue);
            }
            Opcode::Return => {
                let value = self.stack.pop()?;
                return self.return_from_frame(Some(value));
            }
            Opcode::ReturnVoid => return self.return_from_frame(None),
        }

        top(&mut self.frames)?.pc = next;
        Ok(Flow::Continue)
    }

    fn jump_target(inst: Instruction, pc: usize, length: usize) -> VmOutcome<usize> {
        let target = inst.jump_target(pc);
        if target < 0 || target as usize > length {
            return Err(VmError::InvalidJumpTarget {
                address: pc,
                target,
                length,
            });
        }
        Ok(target as usize)
    }

    fn push(&mut self, value: Value) -> VmOutcome<()> {
        self.stack.push_or_release(value, &mut self.heap)
    }

    /// Pop a value of one primitive type, releasing it on a mismatch
    fn pop_as<T>(
        &mut self,
        expected: &'static str,
        extract: fn(&Value) -> Option<T>,
    ) -> VmOutcome<T> {
        let value = self.stack.pop()?;
        match extract(&value) {
            Some(inner) => Ok(inner),
            None => {
                self.heap.release_value(value)?;
                Err(VmError::type_mismatch(expected, &value))
            }
        }
    }

    fn pop_int(&mut self) -> VmOutcome<i64> {
        self.pop_as("int", Value::as_int)
    }

    fn pop_float(&mut self) -> VmOutcome<f64> {
        self.pop_as("float", Value::as_float)
    }

    fn pop_bool(&mut self) -> VmOutcome<bool> {
        self.pop_as("bool", Value::as_bool)
    }

    /// Pop an array reference; the caller owns the popped reference
    fn pop_array(&mut self) -> VmOutcome<core_types::HeapId> {
        self.pop_as("array", Value::as_array)
    }

    /// Fault before any operand is consumed; a non-int divisor is left for `pop_int`
    fn check_int_divisor(&self) -> VmOutcome<()> {
        match self.stack.peek()? {
            Value::Int(0) => Err(VmError::DivisionByZero),
            _ => Ok(()),
        }
    }

    fn check_float_divisor(&self) -> VmOutcome<()> {
        match self.stack.peek()? {
            Value::Float(d) if d == 0.0 => Err(VmError::DivisionByZero),
            _ => Ok(()),
        }
    }

    fn binary_int(&mut self, op: fn(i64, i64) -> i64) -> VmOutcome<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.push(Value::Int(op(a, b)))
    }

    fn binary_float(&mut self, op: fn(f64, f64) -> f64) -> VmOutcome<()> {
        let b = self.pop_float()?;
        let a = self.pop_float()?;
        self.push(Value::Float(op(a, b)))
    }

    fn compare_int(&mut self, op: fn(i64, i64) -> bool) -> VmOutcome<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.push(Value::Bool(op(a, b)))
    }

    fn compare_float(&mut self, op: fn(f64, f64) -> bool) -> VmOutcome<()> {
        let b = self.pop_float()?;
        let a = self.pop_float()?;
        self.push(Value::Bool(op(a, b)))
    }

    fn add_to_local(&mut self, index: usize, delta: i64) -> VmOutcome<()> {
        let locals = &mut top(&mut self.frames)?.locals;
        let current = locals.get(index)?;
        let n = current
            .as_int()
            .ok_or_else(|| VmError::type_mismatch("int", &current))?;
        locals.set_int(index, n.wrapping_add(delta))
    }

    /// Pop index and array and store `value`; the array reference is released
    fn store_element(&mut self, value: Value) -> VmOutcome<()> {
        let index = self.pop_int()?;
        let id = self.pop_array()?;
        let stored = self.heap.store(id, index, value);
        self.heap.release(id)?;
        stored
    }

    fn render(&self, value: Value) -> VmOutcome<String> {
        match value {
            Value::Array(id) => Ok(self.heap.to_host(id)?.to_string()),
            other => Ok(other.to_string()),
        }
    }
}
